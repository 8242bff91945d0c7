//! E2E Scenario: backend failures and how far the engine degrades.

use std::sync::Arc;

use super::fixture::{deterministic, retriever_with};
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::error::RagError;
use oneiric::search::weights::SignalWeights;
use oneiric::test_utils::doubles::{FailingEmbedder, FailingLexicalBackend, FailingVectorStore};
use oneiric::test_utils::fixtures::{SCENARIO_QUERY, fixture_retriever_builder};

#[tokio::test]
async fn lexical_outage_falls_back_to_semantic_results() {
    let retriever = retriever_with(Config::default(), Some(Arc::new(FailingLexicalBackend)), None)
        .await
        .unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap();

    assert!(ctx.diagnostics.lexical_degraded.is_some());
    assert!(ctx.diagnostics.semantic_degraded.is_none());
    assert_eq!(ctx.diagnostics.lexical_candidates, 0);
    assert!(!ctx.relevant_passages.is_empty());
    assert!(ctx.relevant_passages.iter().all(|p| p.scores.lexical == 0.0));
    assert!(ctx.relevant_passages.iter().any(|p| p.id == "jung-serpent-1"));
}

#[tokio::test]
async fn vector_store_outage_falls_back_to_lexical_results() {
    let retriever = retriever_with(Config::default(), None, Some(Arc::new(FailingVectorStore)))
        .await
        .unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap();

    assert!(ctx.diagnostics.semantic_degraded.is_some());
    assert_eq!(ctx.diagnostics.semantic_candidates, 0);
    for passage in &ctx.relevant_passages {
        assert_eq!(passage.scores.semantic, 0.0);
        assert!(passage.id != "jung-football-1" && passage.id != "jung-cooking-1");
    }
}

#[tokio::test]
async fn both_arms_down_is_an_error() {
    let retriever = retriever_with(
        Config::default(),
        Some(Arc::new(FailingLexicalBackend)),
        Some(Arc::new(FailingVectorStore)),
    )
    .await
    .unwrap();
    let err = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::SemanticBackendUnavailable(_)));
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn lexical_outage_is_fatal_when_only_lexical_was_weighted() {
    let retriever = retriever_with(Config::default(), Some(Arc::new(FailingLexicalBackend)), None)
        .await
        .unwrap();
    let options = deterministic(Interpreter::Jung, 3).with_weights(SignalWeights::new(0.0, 0.0, 1.0));
    let err = retriever.search(SCENARIO_QUERY, &options).await.unwrap_err();
    assert!(matches!(err, RagError::LexicalBackendUnavailable(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn embedding_outage_is_fatal() {
    let retriever = fixture_retriever_builder(Config::default())
        .await
        .unwrap()
        .embedder(Arc::new(FailingEmbedder))
        .build()
        .unwrap();
    let err = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    assert!(!err.is_recoverable());
}
