//! Hybrid passage retrieval that grounds dream interpretations in
//! psychoanalytic source texts.
//!
//! Start with [`search::HybridRetriever`]: give it a lexical backend, a vector
//! store and (optionally) an embedding provider, then call
//! [`search`](search::HybridRetriever::search) with a dream narrative.

pub mod config;
pub mod core;
pub mod error;
pub mod lexicon;
pub mod logging;
pub mod search;
pub mod test_utils;

pub use config::Config;
pub use error::{RagError, Result};
pub use search::{HybridRetriever, RagContext, SearchOptions};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
