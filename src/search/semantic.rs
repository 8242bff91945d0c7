//! Semantic search arm
//!
//! Embeds the query and asks the vector store for neighbours. Embedding
//! failures are fatal to the search; vector store failures degrade the arm.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::fragment::Interpreter;
use crate::error::Result;
use crate::search::embeddings::EmbeddingProvider;
use crate::search::vector::{SemanticHit, VectorQuery, VectorStore};

/// Per-call semantic parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticParams {
    pub interpreter: Interpreter,
    pub threshold: f32,
    pub limit: usize,
    pub theme_codes: Vec<String>,
    pub theme_prefilter: bool,
    pub min_association_similarity: f32,
    /// Send the sparse query weights when the provider produces them
    pub use_sparse: bool,
}

/// Semantic arm result; `degraded` carries the reason when the store failed
#[derive(Debug, Clone, Default)]
pub struct SemanticOutcome {
    pub hits: Vec<SemanticHit>,
    pub degraded: Option<String>,
    /// Whether a sparse query vector was sent
    pub sparse_used: bool,
}

#[derive(Clone)]
pub struct SemanticSearcher {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl SemanticSearcher {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Run the semantic arm.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`](crate::error::RagError::EmbeddingUnavailable)
    /// when the query cannot be embedded. Store errors are reported through
    /// [`SemanticOutcome::degraded`] instead.
    pub async fn search(&self, text: &str, params: SemanticParams) -> Result<SemanticOutcome> {
        let embedding = self.embedder.embed(text).await?;
        let sparse = if params.use_sparse { embedding.sparse } else { None };
        let sparse_used = sparse.as_ref().is_some_and(|s| !s.is_empty());

        let query = VectorQuery {
            dense: embedding.dense,
            sparse,
            interpreter: params.interpreter,
            threshold: params.threshold,
            limit: params.limit,
            theme_codes: params.theme_codes,
            theme_prefilter: params.theme_prefilter,
            min_association_similarity: params.min_association_similarity,
        };

        match self.store.similarity_search(&query).await {
            Ok(hits) => {
                debug!(
                    store = self.store.name(),
                    hits = hits.len(),
                    sparse = sparse_used,
                    "semantic arm complete"
                );
                Ok(SemanticOutcome {
                    hits,
                    degraded: None,
                    sparse_used,
                })
            }
            Err(err) => {
                warn!(store = self.store.name(), error = %err, "vector store unavailable, continuing without semantic signal");
                Ok(SemanticOutcome {
                    hits: Vec::new(),
                    degraded: Some(err.to_string()),
                    sparse_used: false,
                })
            }
        }
    }
}
