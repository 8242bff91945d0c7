//! Query embeddings
//!
//! [`EmbeddingProvider`] is the seam to whatever model produces dense (and
//! optionally sparse) vectors. The crate ships a deterministic FNV-1a hash
//! embedder, an HTTP client for OpenAI-compatible endpoints, and an LRU cache
//! that wraps either.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::core::fragment::SparseVector;
use crate::error::{RagError, Result};
use crate::search::embeddings_api::HttpEmbeddingProvider;
use crate::search::tokenize::{is_stop_word, tokenize};

/// Dense vector plus optional sparse token weights for one text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryEmbedding {
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
}

/// Pluggable embedding backend
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Failures surface as [`RagError::EmbeddingUnavailable`].
    async fn embed(&self, text: &str) -> Result<QueryEmbedding>;

    fn dims(&self) -> usize;

    fn name(&self) -> &str;
}

/// Build the configured embedding provider, wrapped in a cache when enabled
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let backend = config.backend.trim().to_lowercase();
    let dims = config.dims;
    if dims == 0 {
        return Err(RagError::Config(
            "embedding.dims must be greater than 0".to_string(),
        ));
    }

    let provider: Arc<dyn EmbeddingProvider> = match backend.as_str() {
        "" | "hash" => Arc::new(HashEmbedder::new(dims).with_sparse(config.sparse)),
        "api" | "http" => Arc::new(HttpEmbeddingProvider::from_config(config)?),
        other => {
            return Err(RagError::Config(format!(
                "unknown embedding backend: {other}"
            )));
        }
    };
    debug!(backend = provider.name(), dims, "embedding provider ready");

    match NonZeroUsize::new(config.cache_capacity) {
        Some(capacity) => Ok(Arc::new(CachedEmbedder::new(provider, capacity))),
        None => Ok(provider),
    }
}

/// Deterministic hash embedder using FNV-1a
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    sparse: bool,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dim: 384,
            sparse: true,
        }
    }
}

impl HashEmbedder {
    pub const fn new(dim: usize) -> Self {
        Self { dim, sparse: true }
    }

    /// Whether to also emit the sparse token-weight map
    #[must_use]
    pub const fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub const fn dims(&self) -> usize {
        self.dim
    }

    /// Dense embedding: hashed unigrams plus half-weight bigrams, L2 normalised
    pub fn embed_dense(&self, text: &str) -> Vec<f32> {
        if self.dim == 0 {
            return Vec::new();
        }

        let tokens = tokenize(text);
        let mut embedding = vec![0.0; self.dim];
        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            accumulate_embedding(&mut embedding, token, 1.0);
        }
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate_embedding(&mut embedding, &bigram, 0.5);
        }

        l2_normalize(&mut embedding);
        embedding
    }

    /// Sparse embedding: stop-word-free term frequencies, L2 normalised
    pub fn embed_sparse(&self, text: &str) -> SparseVector {
        let mut weights: SparseVector = HashMap::new();
        for token in tokenize(text) {
            if !is_stop_word(&token) {
                *weights.entry(token).or_insert(0.0) += 1.0;
            }
        }
        let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for weight in weights.values_mut() {
                *weight /= norm;
            }
        }
        weights
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<QueryEmbedding> {
        Ok(QueryEmbedding {
            dense: self.embed_dense(text),
            sparse: self.sparse.then(|| self.embed_sparse(text)),
        })
    }

    fn dims(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// LRU cache in front of another provider, keyed on the exact query text
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, QueryEmbedding>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<QueryEmbedding> {
        let cached = self.cache.lock().get(text).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Cosine similarity of two dense vectors (0 on length mismatch or zero norm)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cosine similarity of two sparse token-weight maps
pub fn sparse_cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f32 = small
        .iter()
        .filter_map(|(token, w)| large.get(token).map(|v| w * v))
        .sum();
    let norm_a = a.values().map(|w| w * w).sum::<f32>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn accumulate_embedding(embedding: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a_hash(token.as_bytes());

    for i in 0..embedding.len() {
        let dim_hash = fnv1a_hash_with_salt(token_hash, i as u64);
        let sign = if dim_hash & 1 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 1) as usize) % embedding.len();
        embedding[dim] += sign;
    }
}

fn fnv1a_hash_with_salt(seed: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a_hash(&bytes)
}

const fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < data.len() {
        hash ^= data[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}
