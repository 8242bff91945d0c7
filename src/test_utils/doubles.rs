//! Deterministic collaborators for tests and benches

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::search::embeddings::{EmbeddingProvider, HashEmbedder, QueryEmbedding, l2_normalize};
use crate::search::lexical::{LexicalBackend, LexicalHit, LexicalQuery};
use crate::search::tokenize::tokenize;
use crate::search::vector::{SemanticHit, VectorQuery, VectorStore};

/// Concept axes and the words that load onto them
const AXES: &[&[&str]] = &[
    &["water", "sea", "ocean", "lake", "river", "flood", "waves", "drowning", "swimming"],
    &["serpent", "serpents", "snake", "snakes", "viper", "reptile"],
    &["falling", "fall", "fell", "descent", "descends", "abyss", "sinking"],
    &["shadow", "stranger", "darkness"],
    &["mother", "maternal", "womb"],
    &["fire", "flame", "flames", "burning"],
    &["flying", "flight", "wings", "soaring"],
    &["house", "cellar", "attic", "room", "rooms"],
];

/// Embeds text as counts over a handful of dream-concept axes.
///
/// Text with no concept words lands on a residual axis orthogonal to every
/// concept, so unrelated passages have zero similarity to concept queries.
/// Sparse weights are stop-word-free term frequencies.
#[derive(Debug, Clone)]
pub struct ConceptAxisEmbedder {
    sparse: HashEmbedder,
}

impl Default for ConceptAxisEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptAxisEmbedder {
    pub const DIMS: usize = AXES.len() + 1;

    pub fn new() -> Self {
        Self {
            sparse: HashEmbedder::new(Self::DIMS).with_sparse(true),
        }
    }

    pub fn embed_dense(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; Self::DIMS];
        for token in tokenize(text) {
            if let Some(axis) = AXES.iter().position(|words| words.contains(&token.as_str())) {
                vector[axis] += 1.0;
            }
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[Self::DIMS - 1] = 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for ConceptAxisEmbedder {
    async fn embed(&self, text: &str) -> Result<QueryEmbedding> {
        Ok(QueryEmbedding {
            dense: self.embed_dense(text),
            sparse: Some(self.sparse.embed_sparse(text)),
        })
    }

    fn dims(&self) -> usize {
        Self::DIMS
    }

    fn name(&self) -> &str {
        "concept_axis"
    }
}

/// Embedder whose every call fails
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<QueryEmbedding> {
        Err(RagError::EmbeddingUnavailable("connection refused".to_string()))
    }

    fn dims(&self) -> usize {
        ConceptAxisEmbedder::DIMS
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Lexical backend that is always down
#[derive(Debug, Default)]
pub struct FailingLexicalBackend;

#[async_trait]
impl LexicalBackend for FailingLexicalBackend {
    async fn lexical_search(&self, _query: &LexicalQuery) -> Result<Vec<LexicalHit>> {
        Err(RagError::LexicalBackendUnavailable("index offline".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Vector store that is always down
#[derive(Debug, Default)]
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn similarity_search(&self, _query: &VectorQuery) -> Result<Vec<SemanticHit>> {
        Err(RagError::SemanticBackendUnavailable("similarity index timed out".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Lexical backend that returns nothing and counts how often it was asked
#[derive(Debug, Default)]
pub struct CountingLexicalBackend {
    calls: AtomicUsize,
}

impl CountingLexicalBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexicalBackend for CountingLexicalBackend {
    async fn lexical_search(&self, _query: &LexicalQuery) -> Result<Vec<LexicalHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embeddings::cosine_similarity;

    #[test]
    fn test_unrelated_text_is_orthogonal() {
        let embedder = ConceptAxisEmbedder::new();
        let query = embedder.embed_dense("a snake in the water");
        let football = embedder.embed_dense("the coach watched the match");
        assert!(cosine_similarity(&query, &football).abs() < 1e-6);
        let serpent = embedder.embed_dense("the serpent coils");
        assert!(cosine_similarity(&query, &serpent) > 0.5);
    }
}
