//! E2E Scenario: the falling/water/snake dream against the Jungian fixture corpus.

use super::fixture::deterministic;
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::search::SearchOptions;
use oneiric::search::weights::WeightProfile;
use oneiric::test_utils::fixtures::{SCENARIO_QUERY, fixture_retriever};

#[tokio::test]
async fn irrelevant_passages_are_filtered_and_relevant_ones_rank() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap();

    let ids: Vec<&str> = ctx.relevant_passages.iter().map(|p| p.id.as_str()).collect();
    assert!(ids.contains(&"jung-serpent-1"), "{ids:?}");
    assert!(ids.iter().any(|id| id.starts_with("jung-water")), "{ids:?}");
    assert!(!ids.contains(&"jung-football-1"), "{ids:?}");
    assert!(!ids.contains(&"jung-cooking-1"), "{ids:?}");
    assert!(ctx.diagnostics.filtered >= 2);
    assert!(
        ctx.themes.iter().any(|t| t == "water" || t == "shadow"),
        "{:?}",
        ctx.themes
    );
}

#[tokio::test]
async fn default_options_use_adaptive_weights() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &SearchOptions::default().with_max_results(3))
        .await
        .unwrap();

    assert_eq!(ctx.diagnostics.weight_profile, Some(WeightProfile::Balanced));
    assert!(ctx.relevant_passages.len() <= 3);
    assert!(
        ctx.relevant_passages
            .iter()
            .any(|p| p.id == "jung-serpent-1")
    );
}

#[tokio::test]
async fn results_clear_quality_floor_and_carry_scores() {
    let config = Config::default();
    let floor = config.retrieval.quality_floor;
    let retriever = fixture_retriever(config).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 5))
        .await
        .unwrap();

    assert!(!ctx.relevant_passages.is_empty());
    for (i, passage) in ctx.relevant_passages.iter().enumerate() {
        assert_eq!(passage.rank, i + 1);
        assert!(passage.hybrid_score > floor, "{passage:?}");
        assert!(passage.scores.semantic > 0.0 || passage.scores.lexical > 0.0);
    }
    assert!(
        ctx.relevant_passages
            .windows(2)
            .all(|w| w[0].hybrid_score >= w[1].hybrid_score)
    );
}

#[tokio::test]
async fn interpreter_scopes_the_corpus() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Freud, 5))
        .await
        .unwrap();
    assert!(ctx.relevant_passages.iter().all(|p| p.id.starts_with("freud-")));

    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Adler, 5))
        .await
        .unwrap();
    assert!(ctx.relevant_passages.is_empty());
}

#[tokio::test]
async fn context_serialises_camel_case() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 2))
        .await
        .unwrap();
    let value = serde_json::to_value(&ctx).unwrap();
    assert!(value["relevantPassages"].is_array());
    assert!(value["relevantPassages"][0]["hybridScore"].is_number());
    assert!(value["matchedThemeCodes"].is_array());
    assert!(value["diagnostics"]["lexicalCandidates"].is_number());
}
