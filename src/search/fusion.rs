//! Score fusion
//!
//! Merges the lexical and semantic arms by fragment id, normalises each signal
//! into [0, 1] and combines them:
//!
//! ```text
//! hybrid = (w_sem·semantic + w_sparse·sparse + w_lex·lexical)
//!          × (1 + theme_boost)
//!          × content_multiplier
//! ```
//!
//! Lexical BM25 scores are max-normalised over the candidate set; dense and
//! sparse similarities are clamped. A signal a candidate lacks contributes 0.
//! Since every factor is non-negative the hybrid score never decreases when a
//! weight increases.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::BoostConfig;
use crate::core::fragment::FragmentMetadata;
use crate::search::lexical::LexicalHit;
use crate::search::tokenize::{overlap_ratio, tokenize};
use crate::search::vector::SemanticHit;
use crate::search::weights::SignalWeights;

/// One fragment with whatever raw signals the arms produced
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub fragment_id: String,
    pub content: String,
    pub metadata: FragmentMetadata,
    /// Theme codes annotated on or associated with the fragment
    pub themes: Vec<String>,
    pub lexical_raw: Option<f32>,
    pub semantic: Option<f32>,
    pub sparse: Option<f32>,
}

impl Candidate {
    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn section(&self) -> Option<&str> {
        self.metadata.section()
    }
}

/// Normalised per-signal scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub semantic: f32,
    pub sparse: f32,
    pub lexical: f32,
}

impl SignalScores {
    pub fn weighted(&self, weights: &SignalWeights) -> f32 {
        weights.semantic * self.semantic + weights.sparse * self.sparse + weights.lexical * self.lexical
    }
}

/// A fused candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub scores: SignalScores,
    pub theme_boost: f32,
    pub content_multiplier: f32,
    pub hybrid: f32,
    /// Query theme codes this candidate matched
    pub matched_themes: Vec<String>,
    /// Share of the query's significant terms present in the content
    pub query_overlap: f32,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.candidate.fragment_id
    }

    pub fn source(&self) -> &str {
        self.candidate.source()
    }

    pub fn section(&self) -> Option<&str> {
        self.candidate.section()
    }

    pub fn has_semantic_signal(&self) -> bool {
        self.scores.semantic > 0.0 || self.scores.sparse > 0.0
    }
}

/// Everything fusion needs besides the candidates
#[derive(Debug, Clone)]
pub struct FusionContext<'a> {
    pub weights: SignalWeights,
    pub query_terms: &'a [String],
    pub theme_codes: &'a [String],
    pub hint_terms: &'a HashSet<String>,
    pub preferred_sources: &'a [String],
    pub boost: &'a BoostConfig,
    /// Additive theme/hint/source bonuses
    pub apply_boosts: bool,
    /// Multiplicative content-type bonus
    pub apply_content_bonus: bool,
}

/// Merge both arms by fragment id; output is ordered by id
pub fn merge(lexical: Vec<LexicalHit>, semantic: Vec<SemanticHit>) -> Vec<Candidate> {
    let mut merged: BTreeMap<String, Candidate> = BTreeMap::new();

    for hit in semantic {
        let candidate = merged.entry(hit.fragment_id.clone()).or_insert_with(|| Candidate {
            fragment_id: hit.fragment_id.clone(),
            content: hit.content.clone(),
            metadata: hit.metadata.clone(),
            themes: Vec::new(),
            lexical_raw: None,
            semantic: None,
            sparse: None,
        });
        candidate.semantic = Some(candidate.semantic.map_or(hit.similarity, |s| s.max(hit.similarity)));
        if let Some(sparse) = hit.sparse_score {
            candidate.sparse = Some(candidate.sparse.map_or(sparse, |s| s.max(sparse)));
        }
        extend_unique(&mut candidate.themes, hit.matched_themes);
    }

    for hit in lexical {
        let candidate = merged.entry(hit.fragment_id.clone()).or_insert_with(|| Candidate {
            fragment_id: hit.fragment_id.clone(),
            content: hit.content.clone(),
            metadata: hit.metadata.clone(),
            themes: Vec::new(),
            lexical_raw: None,
            semantic: None,
            sparse: None,
        });
        candidate.lexical_raw = Some(candidate.lexical_raw.map_or(hit.raw_score, |s| s.max(hit.raw_score)));
        extend_unique(&mut candidate.themes, hit.themes);
    }

    merged.into_values().collect()
}

fn extend_unique(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Score every candidate; output is sorted by hybrid score, ties by id
pub fn fuse(candidates: Vec<Candidate>, ctx: &FusionContext<'_>) -> Vec<ScoredCandidate> {
    let max_lexical = candidates
        .iter()
        .filter_map(|c| c.lexical_raw)
        .fold(0.0_f32, f32::max);
    let wanted: HashSet<&str> = ctx.theme_codes.iter().map(String::as_str).collect();
    let preferred: HashSet<&str> = ctx.preferred_sources.iter().map(String::as_str).collect();

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let scores = SignalScores {
                semantic: candidate.semantic.unwrap_or(0.0).clamp(0.0, 1.0),
                sparse: candidate.sparse.unwrap_or(0.0).clamp(0.0, 1.0),
                lexical: match candidate.lexical_raw {
                    Some(raw) if max_lexical > 0.0 => (raw / max_lexical).clamp(0.0, 1.0),
                    _ => 0.0,
                },
            };

            let tokens: HashSet<String> = tokenize(&candidate.content).into_iter().collect();
            let query_overlap = overlap_ratio(ctx.query_terms, &tokens);

            let matched_themes: Vec<String> = candidate
                .themes
                .iter()
                .filter(|code| wanted.contains(code.as_str()))
                .cloned()
                .collect();

            let theme_boost = if ctx.apply_boosts {
                theme_bonus(matched_themes.len(), ctx.boost)
                    + if ctx.hint_terms.iter().any(|t| tokens.contains(t)) {
                        ctx.boost.hint_overlap
                    } else {
                        0.0
                    }
                    + if preferred.contains(candidate.source()) {
                        ctx.boost.preferred_source
                    } else {
                        0.0
                    }
            } else {
                0.0
            };

            let content_multiplier = if ctx.apply_content_bonus {
                ctx.boost
                    .content_multipliers
                    .for_type(candidate.metadata.content_type)
            } else {
                1.0
            };

            let hybrid = scores.weighted(&ctx.weights) * (1.0 + theme_boost) * content_multiplier;

            ScoredCandidate {
                candidate,
                scores,
                theme_boost,
                content_multiplier,
                hybrid,
                matched_themes,
                query_overlap,
            }
        })
        .collect();

    sort_by_score(&mut scored);
    scored
}

/// +theme_match for the first code, +theme_match_step for each further code, capped
#[allow(clippy::cast_precision_loss)]
fn theme_bonus(matches: usize, boost: &BoostConfig) -> f32 {
    if matches == 0 {
        return 0.0;
    }
    let extra = (matches - 1) as f32 * boost.theme_match_step;
    (boost.theme_match + extra).min(boost.theme_match_cap)
}

/// Descending by hybrid score, ties by fragment id
pub fn sort_by_score(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| {
        b.hybrid
            .total_cmp(&a.hybrid)
            .then_with(|| a.id().cmp(b.id()))
    });
}

/// Drop candidates at or below `floor`, and candidates without semantic signal
/// whose query-term overlap is below `min_overlap`. Returns the survivors and
/// the number dropped.
pub fn quality_filter(
    scored: Vec<ScoredCandidate>,
    floor: f32,
    min_overlap: f32,
) -> (Vec<ScoredCandidate>, usize) {
    let before = scored.len();
    let kept: Vec<ScoredCandidate> = scored
        .into_iter()
        .filter(|c| c.hybrid > floor)
        .filter(|c| c.has_semantic_signal() || c.query_overlap >= min_overlap)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
