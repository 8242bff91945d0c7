//! Symbol lexicon asset
//!
//! Symbol-pattern regexes and interpreter vocabularies are data, not code: the
//! lexicon is a versioned YAML document that can be swapped without touching
//! the ranking engine. A copy is embedded in the crate and used unless a path
//! is configured.

use std::collections::HashMap;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::core::fragment::Interpreter;
use crate::error::{RagError, Result};

const BUILTIN_LEXICON: &str = include_str!("../assets/symbol_lexicon.yaml");

#[derive(Debug, Deserialize)]
struct LexiconFile {
    version: u32,
    #[serde(default = "default_max_interpretations")]
    max_interpretations: usize,
    #[serde(default = "default_min_sentence_chars")]
    min_sentence_chars: usize,
    #[serde(default = "default_max_sentence_chars")]
    max_sentence_chars: usize,
    symbols: Vec<SymbolSpec>,
    #[serde(default)]
    interpreter_terms: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SymbolSpec {
    symbol: String,
    patterns: Vec<String>,
    variations: Vec<String>,
    #[serde(default)]
    interpreters: Vec<String>,
}

const fn default_max_interpretations() -> usize {
    3
}

const fn default_min_sentence_chars() -> usize {
    30
}

const fn default_max_sentence_chars() -> usize {
    320
}

/// One canonical symbol with its compiled patterns
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub symbol: String,
    patterns: Vec<Regex>,
    variation_pattern: Regex,
    variations: Vec<String>,
    interpreters: Vec<Interpreter>,
}

impl SymbolEntry {
    /// Whether the dream text mentions this symbol
    pub fn matches_dream(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Whether a passage sentence mentions any lexical variation of the symbol
    pub fn mentioned_in(&self, sentence: &str) -> bool {
        self.variation_pattern.is_match(sentence)
    }

    pub fn variations(&self) -> &[String] {
        &self.variations
    }

    /// Empty restriction list means the symbol applies to every interpreter
    pub fn applies_to(&self, interpreter: Interpreter) -> bool {
        self.interpreters.is_empty() || self.interpreters.contains(&interpreter)
    }
}

/// A theoretical term and the pattern that finds it in passage text
#[derive(Debug, Clone)]
pub struct TheoryTerm {
    pub label: String,
    pattern: Regex,
}

impl TheoryTerm {
    pub fn found_in(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Compiled symbol lexicon
#[derive(Debug, Clone)]
pub struct SymbolLexicon {
    version: u32,
    pub max_interpretations: usize,
    pub min_sentence_chars: usize,
    pub max_sentence_chars: usize,
    symbols: Vec<SymbolEntry>,
    terms: HashMap<Interpreter, Vec<TheoryTerm>>,
}

impl SymbolLexicon {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_LEXICON)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            RagError::Asset(format!("read symbol lexicon {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: LexiconFile = serde_yaml::from_str(raw)?;
        if file.min_sentence_chars > file.max_sentence_chars {
            return Err(RagError::Asset(format!(
                "min_sentence_chars ({}) exceeds max_sentence_chars ({})",
                file.min_sentence_chars, file.max_sentence_chars
            )));
        }

        let symbols = file
            .symbols
            .into_iter()
            .map(compile_symbol)
            .collect::<Result<Vec<_>>>()?;

        let mut terms = HashMap::new();
        for (name, labels) in file.interpreter_terms {
            let interpreter = Interpreter::parse(&name).ok_or_else(|| {
                RagError::Asset(format!("unknown interpreter in lexicon: {name}"))
            })?;
            let compiled = labels
                .into_iter()
                .map(|label| {
                    let pattern = phrase_pattern(&label)?;
                    Ok(TheoryTerm { label, pattern })
                })
                .collect::<Result<Vec<_>>>()?;
            terms.insert(interpreter, compiled);
        }

        Ok(Self {
            version: file.version,
            max_interpretations: file.max_interpretations,
            min_sentence_chars: file.min_sentence_chars,
            max_sentence_chars: file.max_sentence_chars,
            symbols,
            terms,
        })
    }

    pub const fn version(&self) -> u32 {
        self.version
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    /// Symbols mentioned in the dream text that apply to this interpreter
    pub fn symbols_in<'a>(
        &'a self,
        text: &'a str,
        interpreter: Interpreter,
    ) -> impl Iterator<Item = &'a SymbolEntry> + 'a {
        self.symbols
            .iter()
            .filter(move |entry| entry.applies_to(interpreter) && entry.matches_dream(text))
    }

    /// Theoretical vocabulary for an interpreter (empty when none is configured)
    pub fn terms_for(&self, interpreter: Interpreter) -> &[TheoryTerm] {
        self.terms.get(&interpreter).map_or(&[][..], Vec::as_slice)
    }

    /// Every symbol variation, lowercased
    pub fn all_variations(&self) -> impl Iterator<Item = String> + '_ {
        self.symbols
            .iter()
            .flat_map(|entry| entry.variations.iter())
            .map(|v| v.to_lowercase())
    }
}

fn compile_symbol(raw: SymbolSpec) -> Result<SymbolEntry> {
    if raw.patterns.is_empty() || raw.variations.is_empty() {
        return Err(RagError::Asset(format!(
            "symbol {} needs at least one pattern and one variation",
            raw.symbol
        )));
    }

    let patterns = raw
        .patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let alternatives = raw
        .variations
        .iter()
        .map(|v| regex::escape(v.trim()).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    let variation_pattern = RegexBuilder::new(&format!(r"\b(?:{alternatives})\w*"))
        .case_insensitive(true)
        .build()?;

    let interpreters = raw
        .interpreters
        .iter()
        .map(|name| {
            Interpreter::parse(name).ok_or_else(|| {
                RagError::Asset(format!("unknown interpreter {name} on symbol {}", raw.symbol))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SymbolEntry {
        symbol: raw.symbol,
        patterns,
        variation_pattern,
        variations: raw.variations,
        interpreters,
    })
}

fn phrase_pattern(phrase: &str) -> Result<Regex> {
    let body = regex::escape(phrase.trim()).replace(' ', r"\s+");
    Ok(RegexBuilder::new(&format!(r"\b{body}\b"))
        .case_insensitive(true)
        .build()?)
}
