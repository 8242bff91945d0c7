//! E2E Scenario: request validation, limits, filters and exclusions.

use std::sync::Arc;

use serde_json::json;

use super::fixture::{FREUD_QUERY, deterministic};
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::error::RagError;
use oneiric::search::SearchOptions;
use oneiric::search::diversity::DiversityMode;
use oneiric::test_utils::doubles::CountingLexicalBackend;
use oneiric::test_utils::fixtures::{SCENARIO_QUERY, fixture_retriever, fixture_retriever_builder};

#[tokio::test]
async fn zero_max_results_returns_empty_without_backend_calls() {
    let counting = Arc::new(CountingLexicalBackend::default());
    let retriever = fixture_retriever_builder(Config::default())
        .await
        .unwrap()
        .lexical_backend(counting.clone())
        .build()
        .unwrap();

    let ctx = retriever
        .search(FREUD_QUERY, &deterministic(Interpreter::Freud, 0))
        .await
        .unwrap();
    assert!(ctx.is_empty());
    assert!(ctx.symbols.is_empty());
    assert!(ctx.themes.is_empty());
    assert_eq!(counting.calls(), 0);
    assert_eq!(retriever.tracker().len(Interpreter::Freud), 0);
}

#[tokio::test]
async fn malformed_filter_fails_before_any_backend_call() {
    let counting = Arc::new(CountingLexicalBackend::default());
    let retriever = fixture_retriever_builder(Config::default())
        .await
        .unwrap()
        .lexical_backend(counting.clone())
        .build()
        .unwrap();

    let options = deterministic(Interpreter::Freud, 3)
        .with_metadata_filter(json!({"source": {"$regex": "Interpretation"}}));
    let err = retriever.search(FREUD_QUERY, &options).await.unwrap_err();
    assert!(matches!(err, RagError::MalformedMetadataFilter(_)));
    assert_eq!(counting.calls(), 0);
}

#[tokio::test]
async fn result_count_never_exceeds_max() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    for max in 1..=9 {
        let ctx = retriever
            .search(FREUD_QUERY, &deterministic(Interpreter::Freud, max))
            .await
            .unwrap();
        assert!(ctx.relevant_passages.len() <= max);
    }
}

#[tokio::test]
async fn metadata_filter_restricts_passages() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let options = deterministic(Interpreter::Freud, 7)
        .with_metadata_filter(json!({"source": "The Interpretation of Dreams", "chapter": {"$ne": "Typical Dreams"}}));
    let ctx = retriever.search(FREUD_QUERY, &options).await.unwrap();

    assert!(!ctx.relevant_passages.is_empty());
    for passage in &ctx.relevant_passages {
        assert_eq!(passage.metadata.source, "The Interpretation of Dreams");
        assert_eq!(passage.metadata.chapter.as_deref(), Some("The Dream-Work"));
    }
    assert!(ctx.diagnostics.excluded > 0);
}

#[tokio::test]
async fn exclusions_remove_ids_and_sources() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let mut options = deterministic(Interpreter::Freud, 7);
    options.exclude_ids = vec!["freud-tid-2".to_string()];
    options.exclude_sources = vec!["On Dreams".to_string()];

    let ctx = retriever.search(FREUD_QUERY, &options).await.unwrap();
    assert!(!ctx.relevant_passages.is_empty());
    assert!(ctx.relevant_passages.iter().all(|p| p.id != "freud-tid-2"));
    assert!(ctx.relevant_passages.iter().all(|p| p.metadata.source != "On Dreams"));
}

#[tokio::test]
async fn out_of_range_threshold_is_rejected() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let options = deterministic(Interpreter::Freud, 3).with_similarity_threshold(-2.0);
    let err = retriever.search(FREUD_QUERY, &options).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidOptions(_)));
}

#[tokio::test]
async fn oversized_max_results_is_bounded_by_candidate_cap() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(FREUD_QUERY, &deterministic(Interpreter::Freud, usize::MAX / 8))
        .await
        .unwrap();
    assert_eq!(ctx.relevant_passages.len(), 7);
    assert!(ctx.diagnostics.lexical_candidates <= 500);
    assert!(ctx.diagnostics.semantic_candidates <= 500);
}

#[tokio::test]
async fn configured_max_results_applies_to_default_options() {
    let config = Config::from_toml_str("[retrieval]\nmax_results = 1\n").unwrap();
    let retriever = fixture_retriever(config).await.unwrap();
    let options = SearchOptions::for_interpreter(Interpreter::Freud)
        .with_adaptive_scoring(false)
        .with_diversity_mode(DiversityMode::TopSimilarity);

    let ctx = retriever.search(FREUD_QUERY, &options).await.unwrap();
    assert_eq!(ctx.relevant_passages.len(), 1);

    let ctx = retriever
        .search(FREUD_QUERY, &options.clone().with_max_results(4))
        .await
        .unwrap();
    assert_eq!(ctx.relevant_passages.len(), 4);
}

#[tokio::test]
async fn configured_include_symbols_applies_to_default_options() {
    let config = Config::from_toml_str("[retrieval]\ninclude_symbols = false\n").unwrap();
    let retriever = fixture_retriever(config).await.unwrap();
    let options = SearchOptions::for_interpreter(Interpreter::Jung)
        .with_max_results(3)
        .with_adaptive_scoring(false)
        .with_diversity_mode(DiversityMode::TopSimilarity);

    let ctx = retriever.search(SCENARIO_QUERY, &options).await.unwrap();
    assert!(ctx.symbols.is_empty());
    assert!(!ctx.relevant_passages.is_empty());

    let ctx = retriever
        .search(SCENARIO_QUERY, &options.with_symbols(true))
        .await
        .unwrap();
    assert!(ctx.symbols.iter().any(|s| s.symbol == "serpent"));
}
