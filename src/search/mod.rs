//! Hybrid retrieval engine
//!
//! Lexical BM25 search and dense/sparse semantic search run concurrently,
//! then fuse into one weighted, theme-boosted, diversity-selected ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │              Dream narrative + SearchOptions                   │
//! └────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │  QueryAnalyzer (query.rs)     │
//!                │  themes, hints, keywords      │
//!                └───────────────────────────────┘
//!                     │                          │
//!                     ▼                          ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │   LexicalSearcher            │  │   SemanticSearcher           │
//! │   (BM25 over a backend)      │  │   (embedding + VectorStore)  │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                     │                          │
//!                     └──────────┬───────────────┘
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │  fusion.rs: weights, boosts,  │
//!                │  quality filter               │
//!                └───────────────────────────────┘
//!                                │
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │  diversity.rs: top-K + history│
//!                └───────────────────────────────┘
//!                                │
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │  symbols.rs: symbols, themes  │
//!                └───────────────────────────────┘
//! ```

pub mod diversity;
pub mod embeddings;
pub mod embeddings_api;
pub mod engine;
pub mod filters;
pub mod fusion;
pub mod lexical;
pub mod query;
pub mod semantic;
pub mod symbols;
pub mod tantivy;
pub mod tokenize;
pub mod vector;
pub mod weights;

// Re-export main types
pub use diversity::{DiversityMode, DiversityPick, DiversityTracker};
pub use embeddings::{
    CachedEmbedder, EmbeddingProvider, HashEmbedder, QueryEmbedding, build_embedder,
};
pub use embeddings_api::HttpEmbeddingProvider;
pub use engine::{
    BoostOptions, HybridRetriever, HybridRetrieverBuilder, RagContext, RankedFragment,
    RetrievalDiagnostics, SearchOptions,
};
pub use filters::{Exclusions, MetadataFilter};
pub use fusion::SignalScores;
pub use lexical::{
    Bm25Params, Bm25Scorer, CorpusStats, LexicalBackend, LexicalHit, LexicalQuery, LexicalSearcher,
};
pub use query::{QueryAnalysis, QueryAnalyzer};
pub use semantic::SemanticSearcher;
pub use symbols::{SymbolExtractor, SymbolInterpretation};
pub use self::tantivy::TantivyFragmentIndex;
pub use vector::{InMemoryVectorIndex, SemanticHit, VectorQuery, VectorStore};
pub use weights::{AdaptiveWeighting, SignalWeights, WeightProfile};
