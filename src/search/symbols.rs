//! Symbol and theme post-processing
//!
//! Runs after selection. Symbols found in the dream text are paired with
//! sentences from the selected passages that mention one of the symbol's
//! variations; passages are also scanned for the interpreter's theoretical
//! vocabulary to produce theme labels. Both feed prompt construction.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::fragment::Interpreter;
use crate::lexicon::SymbolLexicon;

/// A dream symbol with passage sentences that speak to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInterpretation {
    pub symbol: String,
    /// Verbatim sentences (or word-boundary prefixes) from selected passages
    pub interpretations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SymbolExtractor {
    lexicon: Arc<SymbolLexicon>,
}

impl SymbolExtractor {
    pub const fn new(lexicon: Arc<SymbolLexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &SymbolLexicon {
        &self.lexicon
    }

    /// Pair each symbol in `dream` with up to `max_interpretations` sentences.
    ///
    /// Passages are scanned in the order given. A symbol with no supporting
    /// sentence is left out.
    pub fn extract_symbols(
        &self,
        dream: &str,
        interpreter: Interpreter,
        passages: &[&str],
    ) -> Vec<SymbolInterpretation> {
        let max = self.lexicon.max_interpretations;
        if max == 0 || passages.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for entry in self.lexicon.symbols_in(dream, interpreter) {
            let mut seen = HashSet::new();
            let mut interpretations = Vec::new();

            'passages: for passage in passages {
                for sentence in sentences(passage) {
                    if sentence.chars().count() < self.lexicon.min_sentence_chars
                        || !entry.mentioned_in(sentence)
                    {
                        continue;
                    }
                    let excerpt = truncate_at_word(sentence, self.lexicon.max_sentence_chars);
                    if seen.insert(excerpt) {
                        interpretations.push(excerpt.to_string());
                        if interpretations.len() >= max {
                            break 'passages;
                        }
                    }
                }
            }

            if !interpretations.is_empty() {
                out.push(SymbolInterpretation {
                    symbol: entry.symbol.clone(),
                    interpretations,
                });
            }
        }
        out
    }

    /// Theoretical-term labels found in any passage, in vocabulary order
    pub fn extract_themes(&self, interpreter: Interpreter, passages: &[&str]) -> Vec<String> {
        self.lexicon
            .terms_for(interpreter)
            .iter()
            .filter(|term| passages.iter().any(|p| term.found_in(p)))
            .map(|term| term.label.clone())
            .collect()
    }
}

/// Split text into trimmed sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, at a line break,
/// or at the end of the text. Every returned slice borrows from `text`.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' | '\r' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                Some(_) => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Prefix of `sentence` of at most `max_chars` characters, cut at the last
/// word boundary when one exists
pub fn truncate_at_word(sentence: &str, max_chars: usize) -> &str {
    let Some((cut, _)) = sentence.char_indices().nth(max_chars) else {
        return sentence;
    };
    let head = &sentence[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end(),
        _ => head,
    }
}
