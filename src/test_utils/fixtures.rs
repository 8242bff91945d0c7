//! Fixture corpus and a retriever wired to in-process backends

use std::sync::Arc;

use crate::config::Config;
use crate::core::fragment::{ContentType, FragmentMetadata, Interpreter, KnowledgeFragment};
use crate::error::Result;
use crate::search::embeddings::EmbeddingProvider;
use crate::search::engine::HybridRetrieverBuilder;
use crate::search::tantivy::TantivyFragmentIndex;
use crate::search::vector::{InMemoryVectorIndex, embed_fragments};
use crate::search::HybridRetriever;
use crate::test_utils::doubles::ConceptAxisEmbedder;

pub const SCENARIO_QUERY: &str = "I was falling through water while a snake watched me";

fn fragment(
    id: &str,
    interpreter: Interpreter,
    source: &str,
    chapter: &str,
    content: &str,
    themes: &[&str],
) -> KnowledgeFragment {
    KnowledgeFragment::new(
        id,
        content,
        interpreter,
        FragmentMetadata::new(source).with_chapter(chapter),
    )
    .with_themes(themes.iter().copied())
}

/// Five Jungian passages: two about water, one about the serpent and two
/// unrelated ones sharing a single word with [`SCENARIO_QUERY`]
pub fn scenario_fragments() -> Vec<KnowledgeFragment> {
    let mut fragments = vec![
        fragment(
            "jung-water-1",
            Interpreter::Jung,
            "Man and His Symbols",
            "Approaching the Unconscious",
            "Water is the commonest symbol for the unconscious. The lake in the valley is \
             the unconscious lying underneath consciousness. The shadow waits at the \
             water's edge for the one who looks down.",
            &["water", "shadow"],
        ),
        fragment(
            "jung-water-2",
            Interpreter::Jung,
            "Symbols of Transformation",
            "The Sacrifice",
            "Whoever descends into the water meets the depths of the psyche. Falling into \
             the sea is a descent into the maternal source of renewal.",
            &["water", "falling"],
        ),
        fragment(
            "jung-serpent-1",
            Interpreter::Jung,
            "Aion",
            "The Structure and Dynamics of the Self",
            "The serpent is the archetypal image of the instinctual psyche, cold and \
             inhuman. In such images the snake often announces a renewal that the ego fears.",
            &["serpent"],
        ),
        fragment(
            "jung-football-1",
            Interpreter::Jung,
            "Sports Almanac",
            "Tactics",
            "Football tactics reward a compact defensive shape; the coach watched the match \
             from the stands.",
            &[],
        ),
        fragment(
            "jung-cooking-1",
            Interpreter::Jung,
            "Kitchen Notes",
            "Sauces",
            "Simmer the stock slowly while the onions soften, then season the sauce to taste.",
            &[],
        ),
    ];
    fragments[2].metadata.content_type = ContentType::Definition;
    fragments
}

/// Freudian passages spread over three works, most of them about water or falling
pub fn freud_fragments() -> Vec<KnowledgeFragment> {
    vec![
        fragment(
            "freud-tid-1",
            Interpreter::Freud,
            "The Interpretation of Dreams",
            "Typical Dreams",
            "Dreams of falling are among the typical dreams; the fall often repeats the \
             games of childhood in which the child was swung and dropped.",
            &["falling"],
        ),
        fragment(
            "freud-tid-2",
            Interpreter::Freud,
            "The Interpretation of Dreams",
            "Typical Dreams",
            "A dream of falling into water may stand for birth, the passage out of the \
             amniotic water into the world.",
            &["falling", "water"],
        ),
        fragment(
            "freud-tid-3",
            Interpreter::Freud,
            "The Interpretation of Dreams",
            "The Dream-Work",
            "Through condensation a single image of the sea can carry several latent \
             thoughts about water, mother and longing.",
            &["water", "mother"],
        ),
        fragment(
            "freud-tid-4",
            Interpreter::Freud,
            "The Interpretation of Dreams",
            "The Dream-Work",
            "Displacement lets a harmless river scene stand in for a forbidden wish.",
            &["water"],
        ),
        fragment(
            "freud-lectures-1",
            Interpreter::Freud,
            "Introductory Lectures on Psycho-Analysis",
            "Symbolism in Dreams",
            "Birth is regularly expressed in dreams by some connection with water; one \
             falls into the water or climbs out of it.",
            &["water", "falling"],
        ),
        fragment(
            "freud-lectures-2",
            Interpreter::Freud,
            "Introductory Lectures on Psycho-Analysis",
            "The Dream-Work",
            "The sensation of sinking or falling belongs to anxiety dreams whose latent \
             content is a repressed wish.",
            &["falling"],
        ),
        fragment(
            "freud-ondreams-1",
            Interpreter::Freud,
            "On Dreams",
            "Chapter IV",
            "The sea and the lake appear in dreams as representations of the maternal body.",
            &["water", "mother"],
        ),
    ]
}

/// Every fixture passage
pub fn fixture_corpus() -> Vec<KnowledgeFragment> {
    let mut corpus = scenario_fragments();
    corpus.extend(freud_fragments());
    corpus
}

/// In-process backends loaded with a corpus
pub struct FixtureBackends {
    pub lexical: Arc<TantivyFragmentIndex>,
    pub vectors: Arc<InMemoryVectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

/// Index `fragments` into a RAM tantivy index and an in-memory vector index,
/// embedding them with [`ConceptAxisEmbedder`]
pub async fn fixture_backends(fragments: Vec<KnowledgeFragment>) -> Result<FixtureBackends> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(ConceptAxisEmbedder::new());
    let fragments = embed_fragments(&embedder, fragments).await?;

    let lexical = TantivyFragmentIndex::open_in_memory()?;
    lexical.index_fragments(&fragments)?;
    lexical.commit()?;

    let vectors = InMemoryVectorIndex::new(ConceptAxisEmbedder::DIMS);
    vectors.insert_all(fragments);

    Ok(FixtureBackends {
        lexical: Arc::new(lexical),
        vectors: Arc::new(vectors),
        embedder,
    })
}

/// Builder over the fixture corpus with a fixed sampling seed
pub async fn fixture_retriever_builder(config: Config) -> Result<HybridRetrieverBuilder> {
    let backends = fixture_backends(fixture_corpus()).await?;
    Ok(HybridRetriever::builder(config)
        .lexical_backend(backends.lexical)
        .vector_store(backends.vectors)
        .embedder(backends.embedder)
        .seed(7))
}

/// Ready-made retriever over the fixture corpus
pub async fn fixture_retriever(config: Config) -> Result<HybridRetriever> {
    fixture_retriever_builder(config).await?.build()
}
