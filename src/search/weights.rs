//! Signal weights
//!
//! The hybrid score is a weighted sum of the semantic (dense), sparse and
//! lexical signals. Weights are either supplied by the caller or chosen by
//! [`AdaptiveWeighting`] from the shape of the query.
//!
//! | profile  | when                                              | sem  | sparse | lex  |
//! |----------|---------------------------------------------------|------|--------|------|
//! | lexical  | ≤5 terms, concrete symbol vocabulary, no abstract  | 0.35 | 0.15   | 0.50 |
//! | semantic | abstract/interpretive vocabulary present           | 0.65 | 0.15   | 0.20 |
//! | sparse   | ≥20 terms                                          | 0.45 | 0.30   | 0.25 |
//! | balanced | otherwise                                          | 0.50 | 0.20   | 0.30 |
//!
//! Rows are evaluated top to bottom; the first match wins.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::theme::ThemeVocabulary;
use crate::error::{RagError, Result};
use crate::lexicon::SymbolLexicon;
use crate::search::tokenize::normalize;

const SHORT_QUERY_TERMS: usize = 5;
const LONG_QUERY_TERMS: usize = 20;

/// Interpretive vocabulary that signals a conceptual rather than a concrete query
const ABSTRACT_TERMS: &[&str] = &[
    "meaning", "means", "mean", "symbolism", "symbolic", "symbolize", "symbolizes", "symbolise",
    "represent", "represents", "representation", "signify", "signifies", "significance",
    "interpret", "interpretation", "unconscious", "subconscious", "conscious", "psyche",
    "psychological", "archetype", "archetypal", "repression", "repressed", "desire",
    "desires", "anxiety", "guilt", "identity", "transformation", "individuation", "libido",
    "wish", "conflict", "emotion", "emotional", "spiritual", "inner", "self", "ego",
    "trauma", "insecurity", "feeling", "feelings", "why",
];

/// Weight per signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub semantic: f32,
    pub sparse: f32,
    pub lexical: f32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self::new(0.5, 0.2, 0.3)
    }
}

impl SignalWeights {
    pub const fn new(semantic: f32, sparse: f32, lexical: f32) -> Self {
        Self {
            semantic,
            sparse,
            lexical,
        }
    }

    /// Weights must be finite and non-negative. They are not renormalised.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("semantic", self.semantic),
            ("sparse", self.sparse),
            ("lexical", self.lexical),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RagError::InvalidOptions(format!(
                    "{name} weight must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Combined weight of the signals the semantic arm produces
    pub fn semantic_arm(&self) -> f32 {
        self.semantic + self.sparse
    }
}

/// Which row of the decision table produced the weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightProfile {
    LexicalFocused,
    SemanticFocused,
    SparseFocused,
    Balanced,
    /// Caller- or config-supplied weights
    Fixed,
}

impl WeightProfile {
    pub const fn weights(self) -> Option<SignalWeights> {
        match self {
            Self::LexicalFocused => Some(SignalWeights::new(0.35, 0.15, 0.50)),
            Self::SemanticFocused => Some(SignalWeights::new(0.65, 0.15, 0.20)),
            Self::SparseFocused => Some(SignalWeights::new(0.45, 0.30, 0.25)),
            Self::Balanced => Some(SignalWeights::new(0.5, 0.2, 0.3)),
            Self::Fixed => None,
        }
    }
}

/// Query-shape based weight selection
#[derive(Debug, Clone)]
pub struct AdaptiveWeighting {
    concrete: HashSet<String>,
    abstract_terms: HashSet<String>,
}

impl AdaptiveWeighting {
    /// Concrete vocabulary is drawn from theme keywords and symbol variations
    pub fn from_assets(vocabulary: &ThemeVocabulary, lexicon: &SymbolLexicon) -> Self {
        let concrete = vocabulary
            .all_keywords()
            .chain(lexicon.all_variations())
            .filter(|word| !word.contains(char::is_whitespace))
            .map(|word| normalize(&word))
            .collect();
        Self {
            concrete,
            abstract_terms: ABSTRACT_TERMS.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    pub fn is_concrete(&self, term: &str) -> bool {
        self.concrete.contains(term)
            || term
                .strip_suffix('s')
                .is_some_and(|stem| self.concrete.contains(stem))
    }

    pub fn is_abstract(&self, term: &str) -> bool {
        self.abstract_terms.contains(term)
    }

    /// Pick the profile for a query's significant terms
    pub fn profile(&self, terms: &[String]) -> WeightProfile {
        let has_abstract = terms.iter().any(|t| self.is_abstract(t));
        let has_concrete = terms.iter().any(|t| self.is_concrete(t));

        if terms.len() <= SHORT_QUERY_TERMS && has_concrete && !has_abstract {
            WeightProfile::LexicalFocused
        } else if has_abstract {
            WeightProfile::SemanticFocused
        } else if terms.len() >= LONG_QUERY_TERMS {
            WeightProfile::SparseFocused
        } else {
            WeightProfile::Balanced
        }
    }

    pub fn choose(&self, terms: &[String]) -> (SignalWeights, WeightProfile) {
        let profile = self.profile(terms);
        (profile.weights().unwrap_or_default(), profile)
    }
}
