//! Shared setup for the end-to-end scenarios.

use std::sync::Arc;

use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::error::Result;
use oneiric::search::diversity::DiversityMode;
use oneiric::search::lexical::LexicalBackend;
use oneiric::search::vector::VectorStore;
use oneiric::search::{HybridRetriever, SearchOptions};
use oneiric::test_utils::fixtures::{fixture_backends, fixture_corpus};

pub const FREUD_QUERY: &str = "falling into deep water";

/// Fixed weights and a deterministic mode
pub fn deterministic(interpreter: Interpreter, max_results: usize) -> SearchOptions {
    SearchOptions::for_interpreter(interpreter)
        .with_max_results(max_results)
        .with_adaptive_scoring(false)
        .with_diversity_mode(DiversityMode::TopSimilarity)
}

/// Fixture retriever with either backend optionally swapped out
pub async fn retriever_with(
    config: Config,
    lexical: Option<Arc<dyn LexicalBackend>>,
    store: Option<Arc<dyn VectorStore>>,
) -> Result<HybridRetriever> {
    let backends = fixture_backends(fixture_corpus()).await?;
    HybridRetriever::builder(config)
        .lexical_backend(lexical.unwrap_or(backends.lexical))
        .vector_store(store.unwrap_or(backends.vectors))
        .embedder(backends.embedder)
        .seed(11)
        .build()
}
