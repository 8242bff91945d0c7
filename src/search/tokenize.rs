//! Text normalisation and tokenisation shared by every retrieval stage
//!
//! Text is NFKD-decomposed with combining marks stripped (so "Ödipus" and
//! "odipus" meet), lowercased, and split on anything that is not alphanumeric.
//! Tokens of two characters or fewer are dropped.

use std::collections::HashSet;
use std::sync::LazyLock;

use itertools::Itertools;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Tokens at or below this many characters carry no retrieval signal
pub const MIN_TOKEN_CHARS: usize = 3;

/// Function words plus vocabulary that appears in nearly every passage of a
/// dream-interpretation corpus.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // english function words
        "the", "and", "was", "were", "are", "for", "with", "that", "this", "these", "those",
        "from", "have", "has", "had", "been", "being", "not", "but", "you", "your", "his",
        "her", "hers", "him", "she", "they", "them", "their", "our", "ours", "its", "who",
        "what", "when", "where", "which", "whose", "whom", "how", "then", "than", "there",
        "here", "into", "onto", "upon", "about", "over", "under", "again", "very", "just",
        "can", "could", "would", "should", "will", "shall", "may", "might", "must", "did",
        "does", "doing", "all", "any", "some", "each", "every", "more", "most", "such", "own",
        "same", "too", "also", "only", "out", "off", "because", "until", "after", "before",
        "one", "myself", "yourself", "himself", "herself", "itself", "ourselves", "themselves",
        // philosophical filler
        "thus", "therefore", "hence", "however", "indeed", "whereas", "whereby", "wherein",
        "merely", "rather", "perhaps", "certain", "certainly", "namely", "something",
        "anything", "nothing", "everything",
        // domain words present in almost every fragment
        "dream", "dreams", "dreamt", "dreamed", "dreaming", "dreamer", "dreamers",
    ]
    .into_iter()
    .collect()
});

/// Whether a (normalised) token is a stop-word
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Decompose, strip diacritics and lowercase
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalise, strip punctuation and split into tokens longer than two characters
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Tokens with stop-words removed, de-duplicated in first-seen order
pub fn significant_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| !is_stop_word(token))
        .unique()
        .collect()
}

/// Share of `terms` present in `content_tokens` (0 when `terms` is empty)
#[allow(clippy::cast_precision_loss)]
pub fn overlap_ratio(terms: &[String], content_tokens: &HashSet<String>) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|t| content_tokens.contains(*t)).count();
    hits as f32 / terms.len() as f32
}
