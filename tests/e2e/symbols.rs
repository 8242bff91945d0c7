//! E2E Scenario: symbol extraction over the selected passages.

use super::fixture::{FREUD_QUERY, deterministic};
use oneiric::config::Config;
use oneiric::core::fragment::Interpreter;
use oneiric::test_utils::fixtures::{SCENARIO_QUERY, fixture_retriever, scenario_fragments};

#[tokio::test]
async fn snake_dream_yields_serpent_sentences_from_the_passage() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(SCENARIO_QUERY, &deterministic(Interpreter::Jung, 3))
        .await
        .unwrap();

    let serpent_text = scenario_fragments()
        .into_iter()
        .find(|f| f.id == "jung-serpent-1")
        .map(|f| f.content)
        .unwrap();

    let serpent = ctx
        .symbols
        .iter()
        .find(|s| s.symbol == "serpent")
        .expect("serpent symbol");
    assert!(!serpent.interpretations.is_empty());
    assert!(
        serpent
            .interpretations
            .iter()
            .any(|sentence| serpent_text.contains(sentence.as_str()))
    );
    assert!(serpent.interpretations.len() <= 3);
}

#[tokio::test]
async fn symbols_can_be_switched_off() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(
            SCENARIO_QUERY,
            &deterministic(Interpreter::Jung, 3).with_symbols(false),
        )
        .await
        .unwrap();
    assert!(ctx.symbols.is_empty());
    assert!(!ctx.relevant_passages.is_empty());
    assert!(!ctx.themes.is_empty());
}

#[tokio::test]
async fn dream_without_symbols_degrades_to_empty_list() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(
            "the coach watched the football match",
            &deterministic(Interpreter::Jung, 3),
        )
        .await
        .unwrap();
    assert!(ctx.symbols.is_empty());
}

#[tokio::test]
async fn freud_passages_label_freudian_terms() {
    let retriever = fixture_retriever(Config::default()).await.unwrap();
    let ctx = retriever
        .search(FREUD_QUERY, &deterministic(Interpreter::Freud, 7))
        .await
        .unwrap();
    assert!(
        ctx.themes
            .iter()
            .any(|t| t == "condensation" || t == "displacement" || t == "repression"),
        "{:?}",
        ctx.themes
    );
    assert!(ctx.symbols.iter().any(|s| s.symbol == "water" || s.symbol == "falling"));
}
