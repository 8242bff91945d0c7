//! E2E Scenario: per-interpreter policy from a TOML config.

use super::fixture::FREUD_QUERY;
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::search::SearchOptions;
use oneiric::search::diversity::DiversityMode;
use oneiric::search::weights::{SignalWeights, WeightProfile};
use oneiric::test_utils::fixtures::fixture_retriever;

const POLICY_TOML: &str = r#"
[diversity]
mode = "top_similarity"

[interpreters.freud]
diversity_mode = "persona_greedy"
weights = { semantic = 0.6, sparse = 0.1, lexical = 0.3 }
preferred_sources = ["On Dreams"]
"#;

#[tokio::test]
async fn policy_supplies_defaults_for_its_interpreter() {
    let config = Config::from_toml_str(POLICY_TOML).unwrap();
    let retriever = fixture_retriever(config).await.unwrap();

    let ctx = retriever
        .search(FREUD_QUERY, &SearchOptions::for_interpreter(Interpreter::Freud))
        .await
        .unwrap();
    assert_eq!(ctx.diagnostics.diversity_mode, Some(DiversityMode::PersonaGreedy));
    assert_eq!(ctx.diagnostics.weight_profile, Some(WeightProfile::Fixed));
    assert_eq!(ctx.diagnostics.weights, Some(SignalWeights::new(0.6, 0.1, 0.3)));

    let boosted = ctx
        .relevant_passages
        .iter()
        .find(|p| p.metadata.source == "On Dreams")
        .expect("preferred source retrieved");
    assert!(boosted.theme_boost >= 0.10);
}

#[tokio::test]
async fn request_options_win_over_policy() {
    let config = Config::from_toml_str(POLICY_TOML).unwrap();
    let retriever = fixture_retriever(config).await.unwrap();

    let options = SearchOptions::for_interpreter(Interpreter::Freud)
        .with_diversity_mode(DiversityMode::BalancedDiverse)
        .with_adaptive_scoring(true);
    let ctx = retriever.search(FREUD_QUERY, &options).await.unwrap();
    assert_eq!(ctx.diagnostics.diversity_mode, Some(DiversityMode::BalancedDiverse));
    assert_ne!(ctx.diagnostics.weight_profile, Some(WeightProfile::Fixed));
}

#[tokio::test]
async fn other_interpreters_use_config_defaults() {
    let config = Config::from_toml_str(POLICY_TOML).unwrap();
    let retriever = fixture_retriever(config).await.unwrap();
    let ctx = retriever
        .search(FREUD_QUERY, &SearchOptions::for_interpreter(Interpreter::Jung))
        .await
        .unwrap();
    assert_eq!(ctx.diagnostics.diversity_mode, Some(DiversityMode::TopSimilarity));
}
