//! Theme vocabulary and fragment↔theme associations
//!
//! The vocabulary is a static asset loaded once at startup. Each theme carries
//! the keywords used by the query analyzer and symbol-interpretation hints; a
//! separate theme→concept table lifts theme codes into higher-level concepts
//! and interpretive hints used as a re-ranking signal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::fragment::Interpreter;
use crate::error::{RagError, Result};

const BUILTIN_THEMES: &str = include_str!("../../assets/themes.json");

/// A dream motif with its keyword vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeTag {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub symbol_hints: Vec<String>,
}

/// Higher-level concepts and interpretive hints for one theme code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapping {
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Extra hints keyed by interpreter name
    #[serde(default)]
    pub persona_hints: BTreeMap<String, Vec<String>>,
}

impl ConceptMapping {
    /// General hints followed by the interpreter's own hints
    pub fn hints_for(&self, interpreter: Interpreter) -> impl Iterator<Item = &str> {
        self.hints.iter().map(String::as_str).chain(
            self.persona_hints
                .get(interpreter.as_str())
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    #[serde(default = "default_version")]
    version: u32,
    themes: Vec<ThemeTag>,
    #[serde(default)]
    concepts: HashMap<String, ConceptMapping>,
}

const fn default_version() -> u32 {
    1
}

/// Read-only theme vocabulary with its theme→concept table
#[derive(Debug, Clone)]
pub struct ThemeVocabulary {
    version: u32,
    themes: Vec<ThemeTag>,
    by_code: HashMap<String, usize>,
    concepts: HashMap<String, ConceptMapping>,
}

impl ThemeVocabulary {
    /// The vocabulary shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_THEMES)
    }

    /// Load a vocabulary asset from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            RagError::Asset(format!("read theme vocabulary {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: VocabularyFile = serde_json::from_str(raw)?;
        Self::from_parts(file.version, file.themes, file.concepts)
    }

    /// Build from already-parsed parts, validating codes and concept keys
    pub fn from_parts(
        version: u32,
        themes: Vec<ThemeTag>,
        concepts: HashMap<String, ConceptMapping>,
    ) -> Result<Self> {
        let mut by_code = HashMap::with_capacity(themes.len());
        for (idx, theme) in themes.iter().enumerate() {
            if theme.code.trim().is_empty() {
                return Err(RagError::Asset(format!("theme #{idx} has an empty code")));
            }
            if by_code.insert(theme.code.clone(), idx).is_some() {
                return Err(RagError::Asset(format!(
                    "duplicate theme code: {}",
                    theme.code
                )));
            }
        }

        if let Some(orphan) = concepts.keys().find(|code| !by_code.contains_key(*code)) {
            return Err(RagError::Asset(format!(
                "concept mapping references unknown theme: {orphan}"
            )));
        }

        Ok(Self {
            version,
            themes,
            by_code,
            concepts,
        })
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub fn themes(&self) -> &[ThemeTag] {
        &self.themes
    }

    pub fn get(&self, code: &str) -> Option<&ThemeTag> {
        self.by_code.get(code).map(|idx| &self.themes[*idx])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn concept(&self, code: &str) -> Option<&ConceptMapping> {
        self.concepts.get(code)
    }

    /// Every keyword across all themes, lowercased
    pub fn all_keywords(&self) -> impl Iterator<Item = String> + '_ {
        self.themes
            .iter()
            .flat_map(|theme| theme.keywords.iter())
            .map(|kw| kw.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

/// Offline-computed edge between a fragment and a theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentThemeAssociation {
    pub fragment_id: String,
    pub theme_code: String,
    /// Similarity in [0, 1]
    pub similarity: f32,
}

impl FragmentThemeAssociation {
    pub fn new(
        fragment_id: impl Into<String>,
        theme_code: impl Into<String>,
        similarity: f32,
    ) -> Result<Self> {
        let assoc = Self {
            fragment_id: fragment_id.into(),
            theme_code: theme_code.into(),
            similarity,
        };
        assoc.check_similarity()?;
        Ok(assoc)
    }

    fn check_similarity(&self) -> Result<()> {
        if self.similarity.is_finite() && (0.0..=1.0).contains(&self.similarity) {
            Ok(())
        } else {
            Err(RagError::InvalidAssociation(format!(
                "similarity {} for {}→{} is outside [0, 1]",
                self.similarity, self.fragment_id, self.theme_code
            )))
        }
    }
}

/// Lookup of validated associations by fragment id
#[derive(Debug, Clone, Default)]
pub struct ThemeAssociationIndex {
    by_fragment: HashMap<String, Vec<(String, f32)>>,
    edges: usize,
}

impl ThemeAssociationIndex {
    /// Validate and index associations.
    ///
    /// Every edge must reference a known fragment and a vocabulary theme, with
    /// similarity in [0, 1].
    pub fn build(
        associations: impl IntoIterator<Item = FragmentThemeAssociation>,
        vocabulary: &ThemeVocabulary,
        fragment_ids: &HashSet<String>,
    ) -> Result<Self> {
        let mut index = Self::default();
        for assoc in associations {
            assoc.check_similarity()?;
            if !fragment_ids.contains(&assoc.fragment_id) {
                return Err(RagError::InvalidAssociation(format!(
                    "unknown fragment: {}",
                    assoc.fragment_id
                )));
            }
            if !vocabulary.contains(&assoc.theme_code) {
                return Err(RagError::InvalidAssociation(format!(
                    "unknown theme: {}",
                    assoc.theme_code
                )));
            }

            let edges = index.by_fragment.entry(assoc.fragment_id).or_default();
            match edges.iter_mut().find(|(code, _)| *code == assoc.theme_code) {
                Some(existing) => existing.1 = existing.1.max(assoc.similarity),
                None => {
                    edges.push((assoc.theme_code, assoc.similarity));
                    index.edges += 1;
                }
            }
        }
        Ok(index)
    }

    /// Theme codes associated with a fragment at or above `min_similarity`
    pub fn themes_for(&self, fragment_id: &str, min_similarity: f32) -> Vec<&str> {
        self.by_fragment
            .get(fragment_id)
            .into_iter()
            .flatten()
            .filter(|(_, sim)| *sim >= min_similarity)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    pub fn similarity(&self, fragment_id: &str, theme_code: &str) -> Option<f32> {
        self.by_fragment
            .get(fragment_id)?
            .iter()
            .find(|(code, _)| code == theme_code)
            .map(|(_, sim)| *sim)
    }

    /// Number of distinct (fragment, theme) edges
    pub const fn len(&self) -> usize {
        self.edges
    }

    pub const fn is_empty(&self) -> bool {
        self.edges == 0
    }
}
