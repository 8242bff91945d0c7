//! BM25 lexical search
//!
//! The lexical backend returns candidate passages for the query terms; this
//! module re-scores them with BM25 so that every backend (tantivy, a SQL
//! full-text index, ...) produces comparable raw scores.
//!
//! ## Scoring
//!
//! ```text
//! score(d) = Σ idf(t) · tf(t,d)·(k1+1) / (tf(t,d) + k1·(1 − b + b·|d|/avgdl))
//! idf(t)   = ln(1 + (N − df(t) + 0.5) / (df(t) + 0.5))
//! ```
//!
//! `N` and `df` are taken over the returned candidate set. `avgdl` comes from
//! the backend's corpus statistics when it reports them, otherwise from the
//! configured constant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::fragment::{FragmentMetadata, Interpreter};
use crate::error::Result;
use crate::search::tokenize::{significant_terms, tokenize};

/// Request sent to a lexical backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalQuery {
    /// Preprocessed significant terms
    pub terms: Vec<String>,
    pub interpreter: Interpreter,
    /// Restrict to fragments annotated with any of these themes (empty = no filter)
    pub theme_codes: Vec<String>,
    pub limit: usize,
}

/// One lexical candidate
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub fragment_id: String,
    /// Backend score on the way in; BM25 score once re-scored by [`LexicalSearcher`]
    pub raw_score: f32,
    pub content: String,
    pub metadata: FragmentMetadata,
    /// Theme codes annotated on the fragment
    pub themes: Vec<String>,
}

/// Corpus-wide statistics a backend may compute at index time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStats {
    pub doc_count: u64,
    pub avg_doc_len: f32,
}

/// Lexical search primitive
#[async_trait]
pub trait LexicalBackend: Send + Sync {
    async fn lexical_search(&self, query: &LexicalQuery) -> Result<Vec<LexicalHit>>;

    /// Real corpus statistics, when the backend tracks them
    fn corpus_stats(&self) -> Option<CorpusStats> {
        None
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// BM25 constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
    /// Assumed average document length in tokens
    pub avg_doc_len: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_doc_len: 120.0,
        }
    }
}

/// BM25 over a candidate set
#[derive(Debug, Clone, Copy, Default)]
pub struct Bm25Scorer {
    params: Bm25Params,
}

impl Bm25Scorer {
    pub const fn new(params: Bm25Params) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> Bm25Params {
        self.params
    }

    /// Replace each hit's `raw_score` with its BM25 score, drop zero-overlap
    /// hits and sort descending (ties by fragment id).
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, terms: &[String], hits: Vec<LexicalHit>, avg_doc_len: f32) -> Vec<LexicalHit> {
        if terms.is_empty() || hits.is_empty() {
            return Vec::new();
        }
        let avgdl = if avg_doc_len > 0.0 {
            avg_doc_len
        } else {
            self.params.avg_doc_len.max(1.0)
        };

        let docs: Vec<(usize, HashMap<String, usize>)> = hits
            .iter()
            .map(|hit| {
                let tokens = tokenize(&hit.content);
                let len = tokens.len();
                let mut tf: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *tf.entry(token).or_insert(0) += 1;
                }
                (len, tf)
            })
            .collect();

        let n = docs.len() as f32;
        let idf: HashMap<&str, f32> = terms
            .iter()
            .map(|term| {
                let df = docs.iter().filter(|(_, tf)| tf.contains_key(term)).count() as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                (term.as_str(), idf)
            })
            .collect();

        let Bm25Params { k1, b, .. } = self.params;
        let mut scored: Vec<LexicalHit> = hits
            .into_iter()
            .zip(docs)
            .filter_map(|(mut hit, (len, tf))| {
                let norm = k1 * (1.0 - b + b * len as f32 / avgdl);
                let score: f32 = terms
                    .iter()
                    .filter_map(|term| {
                        let freq = *tf.get(term)? as f32;
                        Some(idf[term.as_str()] * freq * (k1 + 1.0) / (freq + norm))
                    })
                    .sum();
                (score > 0.0).then(|| {
                    hit.raw_score = score;
                    hit
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then_with(|| a.fragment_id.cmp(&b.fragment_id))
        });
        scored
    }
}

/// Lexical arm result; `degraded` carries the reason when the backend failed
#[derive(Debug, Clone, Default)]
pub struct LexicalOutcome {
    pub hits: Vec<LexicalHit>,
    pub degraded: Option<String>,
}

/// Preprocesses the query, calls the backend and BM25-ranks the candidates
#[derive(Clone)]
pub struct LexicalSearcher {
    backend: Arc<dyn LexicalBackend>,
    scorer: Bm25Scorer,
}

impl LexicalSearcher {
    pub fn new(backend: Arc<dyn LexicalBackend>, params: Bm25Params) -> Self {
        Self {
            backend,
            scorer: Bm25Scorer::new(params),
        }
    }

    /// Search the lexical arm.
    ///
    /// Never fails: a backend error yields an empty, degraded outcome so the
    /// caller can continue with the semantic signal alone.
    pub async fn search(
        &self,
        text: &str,
        interpreter: Interpreter,
        theme_filter: &[String],
        limit: usize,
    ) -> LexicalOutcome {
        let terms = significant_terms(text);
        if terms.is_empty() || limit == 0 {
            return LexicalOutcome::default();
        }

        let query = LexicalQuery {
            terms,
            interpreter,
            theme_codes: theme_filter.to_vec(),
            limit,
        };

        let hits = match self.backend.lexical_search(&query).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(backend = self.backend.name(), error = %err, "lexical backend unavailable, continuing without lexical signal");
                return LexicalOutcome {
                    hits: Vec::new(),
                    degraded: Some(err.to_string()),
                };
            }
        };

        let avg_doc_len = match self.backend.corpus_stats() {
            Some(stats) if stats.avg_doc_len > 0.0 => {
                debug!(avg_doc_len = stats.avg_doc_len, docs = stats.doc_count, "bm25 using corpus statistics");
                stats.avg_doc_len
            }
            _ => {
                debug!(avg_doc_len = self.scorer.params().avg_doc_len, "bm25 using assumed average document length");
                self.scorer.params().avg_doc_len
            }
        };

        let candidates = hits.len();
        let mut ranked = self.scorer.score(&query.terms, hits, avg_doc_len);
        ranked.truncate(limit);
        debug!(candidates, ranked = ranked.len(), "lexical arm scored");

        LexicalOutcome {
            hits: ranked,
            degraded: None,
        }
    }
}
