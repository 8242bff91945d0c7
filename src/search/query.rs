//! Query analysis
//!
//! Extracts theme codes, higher-level concepts, interpretive hints and
//! significant keywords from a dream narrative. This is the cheap synchronous
//! first stage; its output drives adaptive weighting and theme boosts.

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::fragment::Interpreter;
use crate::core::theme::ThemeVocabulary;
use crate::search::tokenize::{normalize, significant_terms};

/// Keywords must be longer than this to count as a theme hit
const MIN_KEYWORD_CHARS: usize = 3;

const INFLECTIONS: [&str; 6] = ["s", "es", "ed", "ing", "er", "ers"];

/// Result of analysing one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Theme codes in vocabulary order
    pub theme_codes: Vec<String>,
    pub concepts: Vec<String>,
    pub interpretive_hints: Vec<String>,
    /// Significant keyword tokens in query order
    pub keywords: Vec<String>,
}

impl QueryAnalysis {
    pub fn has_themes(&self) -> bool {
        !self.theme_codes.is_empty()
    }

    /// Significant terms drawn from the interpretive hints
    pub fn hint_terms(&self) -> HashSet<String> {
        self.interpretive_hints
            .iter()
            .flat_map(|hint| significant_terms(hint))
            .collect()
    }
}

/// Maps free text onto the theme vocabulary
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    vocabulary: Arc<ThemeVocabulary>,
}

impl QueryAnalyzer {
    pub const fn new(vocabulary: Arc<ThemeVocabulary>) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &ThemeVocabulary {
        &self.vocabulary
    }

    /// Analyse a dream narrative for the given interpreter.
    ///
    /// Empty or very short text yields an empty analysis rather than an error.
    pub fn analyze(&self, text: &str, interpreter: Interpreter) -> QueryAnalysis {
        let keywords = significant_terms(text);
        if text.trim().chars().count() < MIN_KEYWORD_CHARS {
            return QueryAnalysis {
                keywords,
                ..QueryAnalysis::default()
            };
        }

        let normalized = normalize(text);
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let joined = format!(" {} ", words.join(" "));

        let theme_codes: Vec<String> = self
            .vocabulary
            .themes()
            .iter()
            .filter(|theme| {
                theme
                    .keywords
                    .iter()
                    .any(|kw| keyword_matches(kw, &words, &joined))
            })
            .map(|theme| theme.code.clone())
            .collect();

        let mut concepts = Vec::new();
        let mut interpretive_hints = Vec::new();
        for code in &theme_codes {
            if let Some(mapping) = self.vocabulary.concept(code) {
                concepts.extend(mapping.concepts.iter().cloned());
                interpretive_hints.extend(mapping.hints_for(interpreter).map(str::to_string));
            }
        }

        QueryAnalysis {
            theme_codes,
            concepts: concepts.into_iter().unique().collect(),
            interpretive_hints: interpretive_hints.into_iter().unique().collect(),
            keywords,
        }
    }
}

/// Case-insensitive keyword match: substring for phrases, word match with
/// simple inflections for single words.
fn keyword_matches(keyword: &str, words: &[&str], joined: &str) -> bool {
    let keyword = normalize(keyword.trim());
    if keyword.chars().count() <= MIN_KEYWORD_CHARS {
        return false;
    }

    if keyword.contains(char::is_whitespace) {
        let phrase = keyword.split_whitespace().join(" ");
        return joined.contains(&format!(" {phrase} "));
    }

    words.iter().any(|word| is_inflection_of(word, &keyword))
}

fn is_inflection_of(word: &str, keyword: &str) -> bool {
    if word == keyword {
        return true;
    }
    if let Some(rest) = word.strip_prefix(keyword) {
        return INFLECTIONS.contains(&rest);
    }
    // escape -> escaping, escaped
    if let Some(stem) = keyword.strip_suffix('e') {
        if let Some(rest) = word.strip_prefix(stem) {
            return rest == "ing" || rest == "ed";
        }
    }
    false
}
