use std::io;

use thiserror::Error;

/// Errors raised by the retrieval engine and its reference backends.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Lexical backend unavailable: {0}")]
    LexicalBackendUnavailable(String),

    #[error("Semantic backend unavailable: {0}")]
    SemanticBackendUnavailable(String),

    #[error("Malformed metadata filter: {0}")]
    MalformedMetadataFilter(String),

    #[error("Invalid search options: {0}")]
    InvalidOptions(String),

    #[error("Invalid theme association: {0}")]
    InvalidAssociation(String),

    #[error("Invalid asset: {0}")]
    Asset(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Search index error: {0}")]
    SearchIndex(#[from] tantivy::TantivyError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),
}

impl RagError {
    /// Whether the engine can continue with the remaining signal after this error.
    ///
    /// Backend outages degrade to a single-arm search; everything else aborts the call.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LexicalBackendUnavailable(_) | Self::SemanticBackendUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
