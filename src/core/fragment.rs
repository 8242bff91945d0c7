//! Knowledge fragments
//!
//! A fragment is one indexed passage of a source work, tagged with the
//! interpreter persona whose corpus it belongs to. Fragments are produced by
//! an offline ingestion pipeline and are read-only at query time.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token → weight map used for keyword-style overlap scoring.
pub type SparseVector = HashMap<String, f32>;

/// Interpreter persona a corpus (and a query) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpreter {
    Jung,
    Freud,
    Adler,
    Lacan,
}

impl Interpreter {
    pub const ALL: [Self; 4] = [Self::Jung, Self::Freud, Self::Adler, Self::Lacan];

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "jung" | "jungian" => Some(Self::Jung),
            "freud" | "freudian" => Some(Self::Freud),
            "adler" | "adlerian" => Some(Self::Adler),
            "lacan" | "lacanian" => Some(Self::Lacan),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Jung => "jung",
            Self::Freud => "freud",
            Self::Adler => "adler",
            Self::Lacan => "lacan",
        }
    }
}

impl std::fmt::Display for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of passage, used for the multiplicative content-type bonus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Theory,
    Example,
    CaseStudy,
    Definition,
    Commentary,
}

impl ContentType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Theory => "theory",
            Self::Example => "example",
            Self::CaseStudy => "case_study",
            Self::Definition => "definition",
            Self::Commentary => "commentary",
        }
    }
}

/// Descriptive metadata carried alongside fragment text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    /// Source work (book or essay title)
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Any further ingestion-time keys (year, page, translator, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FragmentMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            chapter: None,
            content_type: ContentType::default(),
            topic: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }

    #[must_use]
    pub const fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up a metadata field by name as a JSON value.
    ///
    /// Named fields take precedence over `extra` keys.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "source" => Some(Value::String(self.source.clone())),
            "chapter" => self.chapter.clone().map(Value::String),
            "content_type" => Some(Value::String(self.content_type.as_str().to_string())),
            "topic" => self.topic.clone().map(Value::String),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Chapter, falling back to topic, used as the secondary diversity key.
    pub fn section(&self) -> Option<&str> {
        self.chapter.as_deref().or(self.topic.as_deref())
    }
}

/// An immutable indexed passage of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFragment {
    pub id: String,
    pub content: String,
    pub interpreter: Interpreter,
    pub metadata: FragmentMetadata,
    /// Dense embedding computed at ingestion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Sparse token weights computed at ingestion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,
    /// Theme codes annotated at ingestion time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,
}

impl KnowledgeFragment {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        interpreter: Interpreter,
        metadata: FragmentMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            interpreter,
            metadata,
            embedding: None,
            sparse: None,
            themes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_sparse(mut self, sparse: SparseVector) -> Self {
        self.sparse = Some(sparse);
        self
    }

    #[must_use]
    pub fn with_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = themes.into_iter().map(Into::into).collect();
        self
    }
}
