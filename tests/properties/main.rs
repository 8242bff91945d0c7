//! Property tests over the public ranking surface.

use std::collections::HashSet;

use proptest::prelude::*;

use oneiric::config::{BoostConfig, Config};
use oneiric::core::fragment::{FragmentMetadata, Interpreter};
use oneiric::search::diversity::DiversityMode;
use oneiric::search::fusion::{self, FusionContext};
use oneiric::search::vector::SemanticHit;
use oneiric::search::weights::SignalWeights;
use oneiric::search::SearchOptions;
use oneiric::test_utils::fixtures::fixture_retriever;

const WORDS: &[&str] = &[
    "water", "snake", "falling", "shadow", "mother", "football", "sauce", "river", "sea",
    "stranger", "deep", "watched", "while", "through", "birth", "the", "dream",
];

fn arb_query() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..8).prop_map(|words| words.join(" "))
}

fn arb_mode() -> impl Strategy<Value = DiversityMode> {
    prop::sample::select(DiversityMode::ALL.to_vec())
}

fn arb_interpreter() -> impl Strategy<Value = Interpreter> {
    prop::sample::select(vec![Interpreter::Jung, Interpreter::Freud])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn search_respects_limit_floor_and_uniqueness(
        query in arb_query(),
        max_results in 0usize..8,
        mode in arb_mode(),
        interpreter in arb_interpreter(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let config = Config::default();
        let floor = config.retrieval.quality_floor;
        let retriever = runtime.block_on(fixture_retriever(config)).unwrap();

        let options = SearchOptions::for_interpreter(interpreter)
            .with_max_results(max_results)
            .with_diversity_mode(mode);
        let ctx = runtime.block_on(retriever.search(&query, &options)).unwrap();

        prop_assert!(ctx.relevant_passages.len() <= max_results);
        let ids: HashSet<&str> = ctx.relevant_passages.iter().map(|p| p.id.as_str()).collect();
        prop_assert_eq!(ids.len(), ctx.relevant_passages.len());
        for passage in &ctx.relevant_passages {
            prop_assert!(passage.hybrid_score > floor);
            prop_assert!(passage.id.starts_with(interpreter.as_str()));
        }
        if max_results == 0 {
            prop_assert!(ctx.symbols.is_empty() && ctx.themes.is_empty());
        }
    }

    #[test]
    fn theme_match_never_ranks_below_equal_unmatched(similarity in 0.05f32..1.0) {
        let hit = |id: &str, themes: Vec<String>| SemanticHit {
            fragment_id: id.to_string(),
            similarity,
            sparse_score: None,
            content: String::new(),
            metadata: FragmentMetadata::new("Source"),
            matched_themes: themes,
        };
        // the unmatched id sorts first on ties
        let semantic = vec![hit("a-plain", Vec::new()), hit("z-themed", vec!["water".to_string()])];

        let themes = vec!["water".to_string()];
        let boost = BoostConfig::default();
        let hints = HashSet::new();
        let ctx = FusionContext {
            weights: SignalWeights::default(),
            query_terms: &[],
            theme_codes: &themes,
            hint_terms: &hints,
            preferred_sources: &[],
            boost: &boost,
            apply_boosts: true,
            apply_content_bonus: true,
        };
        let scored = fusion::fuse(fusion::merge(Vec::new(), semantic), &ctx);
        prop_assert_eq!(scored[0].id(), "z-themed");
    }

    #[test]
    fn hybrid_score_is_monotonic_in_each_weight(
        semantic in 0.0f32..1.0,
        sparse in 0.0f32..1.0,
        base in 0.0f32..1.0,
        bump in 0.0f32..1.0,
    ) {
        let scores = fusion::SignalScores { semantic, sparse, lexical: 0.5 };
        let low = SignalWeights::new(base, base, base);
        for raised in [
            SignalWeights::new(base + bump, base, base),
            SignalWeights::new(base, base + bump, base),
            SignalWeights::new(base, base, base + bump),
        ] {
            prop_assert!(scores.weighted(&raised) >= scores.weighted(&low));
        }
    }
}
