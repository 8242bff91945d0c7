//! E2E Scenario: diversity modes over the Freudian fixture corpus.
//!
//! Seven passages from three works all match the query, so every mode has
//! room to choose.

use std::collections::{HashMap, HashSet};

use super::fixture::{FREUD_QUERY, deterministic};
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::search::diversity::DiversityMode;
use oneiric::search::{RagContext, SearchOptions};
use oneiric::test_utils::fixtures::fixture_retriever;

fn options(mode: DiversityMode, max_results: usize) -> SearchOptions {
    deterministic(Interpreter::Freud, max_results).with_diversity_mode(mode)
}

fn sources(ctx: &RagContext) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for passage in &ctx.relevant_passages {
        *counts.entry(passage.metadata.source.clone()).or_insert(0) += 1;
    }
    counts
}

#[tokio::test]
async fn top_similarity_is_deterministic() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let first = retriever
        .search(FREUD_QUERY, &options(DiversityMode::TopSimilarity, 4))
        .await
        .unwrap();
    let second = retriever
        .search(FREUD_QUERY, &options(DiversityMode::TopSimilarity, 4))
        .await
        .unwrap();
    let ids = |ctx: &RagContext| ctx.relevant_passages.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.relevant_passages.len(), 4);
}

#[tokio::test]
async fn balanced_diverse_spans_several_sources() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(FREUD_QUERY, &options(DiversityMode::BalancedDiverse, 4))
        .await
        .unwrap();
    assert_eq!(ctx.relevant_passages.len(), 4);
    assert!(sources(&ctx).len() >= 2, "{:?}", sources(&ctx));
}

#[tokio::test]
async fn weighted_random_returns_exactly_k_distinct() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    for _ in 0..5 {
        let ctx = retriever
            .search(FREUD_QUERY, &options(DiversityMode::WeightedRandom, 5))
            .await
            .unwrap();
        let ids: HashSet<&str> = ctx.relevant_passages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 5);
    }
}

#[tokio::test]
async fn persona_greedy_caps_each_source_at_two() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(FREUD_QUERY, &options(DiversityMode::PersonaGreedy, 5))
        .await
        .unwrap();
    assert!(!ctx.relevant_passages.is_empty());
    assert!(sources(&ctx).values().all(|count| *count <= 2), "{:?}", sources(&ctx));
}

#[tokio::test]
async fn history_is_kept_per_persona_and_bounded() {
    let mut config = Config::default();
    config.diversity.history_cap = 4;
    let retriever = fixture_retriever(config).await.unwrap();

    let first = retriever
        .search(FREUD_QUERY, &options(DiversityMode::PersonaGreedy, 3))
        .await
        .unwrap();
    let second = retriever
        .search(FREUD_QUERY, &options(DiversityMode::PersonaGreedy, 3))
        .await
        .unwrap();

    assert_eq!(
        first.relevant_passages[0].id,
        second.relevant_passages[0].id
    );
    assert_eq!(retriever.tracker().len(Interpreter::Freud), 4);
    assert_eq!(retriever.tracker().len(Interpreter::Jung), 0);
}
