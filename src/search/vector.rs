//! Vector similarity store
//!
//! [`VectorStore`] is the seam to the similarity index (pgvector, qdrant, ...).
//! [`InMemoryVectorIndex`] is the in-process reference implementation: brute
//! force cosine over fragment embeddings, filtered by interpreter and theme.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::fragment::{FragmentMetadata, Interpreter, KnowledgeFragment, SparseVector};
use crate::core::theme::{FragmentThemeAssociation, ThemeAssociationIndex, ThemeVocabulary};
use crate::error::{RagError, Result};
use crate::search::embeddings::{EmbeddingProvider, cosine_similarity, sparse_cosine};

/// Request sent to a vector store
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub interpreter: Interpreter,
    /// Minimum dense cosine similarity
    pub threshold: f32,
    pub limit: usize,
    pub theme_codes: Vec<String>,
    /// Only return fragments matching at least one of `theme_codes`
    pub theme_prefilter: bool,
    /// Association edges below this similarity are ignored
    pub min_association_similarity: f32,
}

/// One semantic candidate
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub fragment_id: String,
    /// Dense cosine similarity
    pub similarity: f32,
    /// Sparse cosine, when both sides carry sparse weights
    pub sparse_score: Option<f32>,
    pub content: String,
    pub metadata: FragmentMetadata,
    /// Query theme codes this fragment is annotated or associated with
    pub matched_themes: Vec<String>,
}

/// Vector similarity primitive
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(&self, query: &VectorQuery) -> Result<Vec<SemanticHit>>;

    fn name(&self) -> &str {
        "vector"
    }
}

/// Brute-force in-memory vector index
pub struct InMemoryVectorIndex {
    dims: usize,
    fragments: RwLock<HashMap<String, KnowledgeFragment>>,
    associations: RwLock<ThemeAssociationIndex>,
}

impl InMemoryVectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fragments: RwLock::new(HashMap::new()),
            associations: RwLock::new(ThemeAssociationIndex::default()),
        }
    }

    pub const fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.fragments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.read().is_empty()
    }

    /// Insert or replace a fragment. Returns false when it has no embedding of
    /// the index dimension.
    pub fn insert(&self, fragment: KnowledgeFragment) -> bool {
        if fragment.embedding.as_ref().map(Vec::len) != Some(self.dims) {
            return false;
        }
        self.fragments.write().insert(fragment.id.clone(), fragment);
        true
    }

    /// Insert many fragments, returning how many were accepted
    pub fn insert_all(&self, fragments: impl IntoIterator<Item = KnowledgeFragment>) -> usize {
        fragments.into_iter().filter(|f| self.insert(f.clone())).count()
    }

    pub fn remove(&self, fragment_id: &str) -> Option<KnowledgeFragment> {
        self.fragments.write().remove(fragment_id)
    }

    /// Replace the fragment↔theme association edges.
    ///
    /// Edges must reference fragments already in the index.
    pub fn set_associations(
        &self,
        associations: impl IntoIterator<Item = FragmentThemeAssociation>,
        vocabulary: &ThemeVocabulary,
    ) -> Result<usize> {
        let ids: HashSet<String> = self.fragments.read().keys().cloned().collect();
        let index = ThemeAssociationIndex::build(associations, vocabulary, &ids)?;
        let edges = index.len();
        *self.associations.write() = index;
        Ok(edges)
    }

    /// Synchronous search used by the store impl
    pub fn search(&self, query: &VectorQuery) -> Result<Vec<SemanticHit>> {
        if query.dense.len() != self.dims {
            return Err(RagError::SemanticBackendUnavailable(format!(
                "query has {} dimensions, index expects {}",
                query.dense.len(),
                self.dims
            )));
        }
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let wanted: HashSet<&str> = query.theme_codes.iter().map(String::as_str).collect();
        let fragments = self.fragments.read();
        let associations = self.associations.read();

        let mut hits: Vec<SemanticHit> = fragments
            .values()
            .filter(|fragment| fragment.interpreter == query.interpreter)
            .filter_map(|fragment| {
                let embedding = fragment.embedding.as_deref()?;

                let mut matched: Vec<String> = fragment
                    .themes
                    .iter()
                    .map(String::as_str)
                    .chain(associations.themes_for(&fragment.id, query.min_association_similarity))
                    .filter(|code| wanted.contains(code))
                    .map(str::to_string)
                    .collect();
                matched.sort();
                matched.dedup();

                if query.theme_prefilter && !wanted.is_empty() && matched.is_empty() {
                    return None;
                }

                let similarity = cosine_similarity(&query.dense, embedding);
                if similarity < query.threshold {
                    return None;
                }

                let sparse_score = match (&query.sparse, &fragment.sparse) {
                    (Some(q), Some(f)) => Some(sparse_cosine(q, f)),
                    _ => None,
                };

                Some(SemanticHit {
                    fragment_id: fragment.id.clone(),
                    similarity,
                    sparse_score,
                    content: fragment.content.clone(),
                    metadata: fragment.metadata.clone(),
                    matched_themes: matched,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.fragment_id.cmp(&b.fragment_id))
        });
        hits.truncate(query.limit);
        debug!(hits = hits.len(), threshold = query.threshold, "vector search");
        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorIndex {
    async fn similarity_search(&self, query: &VectorQuery) -> Result<Vec<SemanticHit>> {
        self.search(query)
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// Fill in missing dense and sparse embeddings using `provider`
pub async fn embed_fragments(
    provider: &Arc<dyn EmbeddingProvider>,
    fragments: Vec<KnowledgeFragment>,
) -> Result<Vec<KnowledgeFragment>> {
    let mut out = Vec::with_capacity(fragments.len());
    for mut fragment in fragments {
        if fragment.embedding.is_none() || fragment.sparse.is_none() {
            let embedding = provider.embed(&fragment.content).await?;
            if fragment.embedding.is_none() {
                fragment.embedding = Some(embedding.dense);
            }
            if fragment.sparse.is_none() {
                fragment.sparse = embedding.sparse;
            }
        }
        out.push(fragment);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embeddings::HashEmbedder;

    fn fragment(id: &str, interpreter: Interpreter, embedding: Vec<f32>) -> KnowledgeFragment {
        KnowledgeFragment::new(
            id,
            format!("content of {id}"),
            interpreter,
            FragmentMetadata::new("Source"),
        )
        .with_embedding(embedding)
    }

    fn query(dense: Vec<f32>) -> VectorQuery {
        VectorQuery {
            dense,
            sparse: None,
            interpreter: Interpreter::Jung,
            threshold: 0.3,
            limit: 10,
            theme_codes: Vec::new(),
            theme_prefilter: false,
            min_association_similarity: 0.5,
        }
    }

    fn index() -> InMemoryVectorIndex {
        let index = InMemoryVectorIndex::new(2);
        index.insert(fragment("a", Interpreter::Jung, vec![1.0, 0.0]));
        index.insert(fragment("b", Interpreter::Jung, vec![0.6, 0.8]).with_themes(["water"]));
        index.insert(fragment("c", Interpreter::Jung, vec![0.0, 1.0]));
        index.insert(fragment("d", Interpreter::Freud, vec![1.0, 0.0]));
        index
    }

    #[test]
    fn test_insert_rejects_wrong_dims() {
        let index = InMemoryVectorIndex::new(3);
        assert!(!index.insert(fragment("a", Interpreter::Jung, vec![1.0, 0.0])));
        let no_embedding = KnowledgeFragment::new("x", "x", Interpreter::Jung, FragmentMetadata::new("s"));
        assert!(!index.insert(no_embedding));
        assert!(index.is_empty());
    }

    #[test]
    fn test_threshold_and_interpreter_filter() {
        let hits = index().search(&query(vec![1.0, 0.0])).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.fragment_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((hits[1].similarity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_zero_rows_is_not_an_error() {
        let mut q = query(vec![1.0, 0.0]);
        q.threshold = 1.5;
        assert!(index().search(&q).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_backend_error() {
        let err = index().search(&query(vec![1.0, 0.0, 0.0])).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_theme_prefilter_uses_annotations_and_associations() {
        let index = index();
        let vocabulary = ThemeVocabulary::builtin().unwrap();
        index
            .set_associations(
                vec![
                    FragmentThemeAssociation::new("c", "water", 0.9).unwrap(),
                    FragmentThemeAssociation::new("a", "water", 0.2).unwrap(),
                ],
                &vocabulary,
            )
            .unwrap();

        let mut q = query(vec![0.7, 0.7]);
        q.theme_codes = vec!["water".into()];
        q.theme_prefilter = true;
        let hits = index.search(&q).unwrap();
        let mut ids: Vec<_> = hits.iter().map(|h| h.fragment_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(hits.iter().all(|h| h.matched_themes == vec!["water"]));
    }

    #[test]
    fn test_associations_must_reference_known_fragments() {
        let index = index();
        let vocabulary = ThemeVocabulary::builtin().unwrap();
        let err = index
            .set_associations(
                vec![FragmentThemeAssociation::new("zzz", "water", 0.9).unwrap()],
                &vocabulary,
            )
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidAssociation(_)));
    }

    #[test]
    fn test_sparse_score_reported() {
        let index = InMemoryVectorIndex::new(2);
        let sparse: SparseVector = [("water".to_string(), 1.0)].into_iter().collect();
        index.insert(fragment("a", Interpreter::Jung, vec![1.0, 0.0]).with_sparse(sparse.clone()));
        let mut q = query(vec![1.0, 0.0]);
        q.sparse = Some(sparse);
        let hits = index.search(&q).unwrap();
        assert!((hits[0].sparse_score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_fragments_fills_missing() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(16));
        let fragments = vec![KnowledgeFragment::new(
            "a",
            "water and serpents",
            Interpreter::Jung,
            FragmentMetadata::new("s"),
        )];
        let embedded = embed_fragments(&provider, fragments).await.unwrap();
        assert_eq!(embedded[0].embedding.as_ref().unwrap().len(), 16);
        assert!(embedded[0].sparse.as_ref().unwrap().contains_key("water"));

        let index = InMemoryVectorIndex::new(16);
        assert_eq!(index.insert_all(embedded), 1);
    }
}
