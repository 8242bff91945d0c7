//! proptest strategies for ranking inputs

use proptest::prelude::*;

use crate::core::fragment::FragmentMetadata;
use crate::search::fusion::{Candidate, ScoredCandidate, SignalScores, sort_by_score};

const SOURCES: [&str; 4] = ["Aion", "Man and His Symbols", "Psychology and Alchemy", "Red Book"];
const CHAPTERS: [&str; 3] = ["I", "II", "III"];

fn arb_scored(index: usize) -> impl Strategy<Value = ScoredCandidate> {
    (0..SOURCES.len(), 0..CHAPTERS.len(), 0.21_f32..1.0).prop_map(
        move |(source, chapter, hybrid)| ScoredCandidate {
            candidate: Candidate {
                fragment_id: format!("frag-{index:03}"),
                content: String::new(),
                metadata: FragmentMetadata::new(SOURCES[source]).with_chapter(CHAPTERS[chapter]),
                themes: Vec::new(),
                lexical_raw: None,
                semantic: Some(hybrid),
                sparse: None,
            },
            scores: SignalScores {
                semantic: hybrid,
                ..SignalScores::default()
            },
            theme_boost: 0.0,
            content_multiplier: 1.0,
            hybrid,
            matched_themes: Vec::new(),
            query_overlap: 0.0,
        },
    )
}

/// A candidate pool with unique ids, sorted the way fusion sorts it
pub fn arb_pool(max_len: usize) -> impl Strategy<Value = Vec<ScoredCandidate>> {
    (1..=max_len).prop_flat_map(|len| {
        (0..len)
            .map(arb_scored)
            .collect::<Vec<_>>()
            .prop_map(|mut pool| {
                sort_by_score(&mut pool);
                pool
            })
    })
}
