use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::fragment::{ContentType, Interpreter};
use crate::error::{RagError, Result};
use crate::search::diversity::DiversityMode;
use crate::search::weights::SignalWeights;

const PROJECT_CONFIG_FILE: &str = "oneiric.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub bm25: Bm25Config,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub diversity: DiversityConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-interpreter policy overrides keyed by interpreter name
    #[serde(default)]
    pub interpreters: BTreeMap<String, InterpreterPolicy>,
}

impl Config {
    /// Layer defaults, global file, project file and `ONEIRIC_*` environment.
    ///
    /// An explicit path (or `ONEIRIC_CONFIG`) replaces the global and project
    /// files.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        Self::load_with_env(explicit_path, project_root, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with an injectable environment lookup
    pub fn load_with_env<F>(
        explicit_path: Option<&Path>,
        project_root: &Path,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env("ONEIRIC_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(project_root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides(&env)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document on top of the defaults (no files, no env)
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let patch: ConfigPatch =
            toml::from_str(raw).map_err(|err| RagError::Config(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("oneiric/config.toml"))
    }

    fn load_project(project_root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&project_root.join(PROJECT_CONFIG_FILE))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| RagError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| RagError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.retrieval {
            self.retrieval.merge(patch);
        }
        if let Some(patch) = patch.bm25 {
            self.bm25.merge(patch);
        }
        if let Some(patch) = patch.boost {
            self.boost.merge(patch);
        }
        if let Some(patch) = patch.diversity {
            self.diversity.merge(patch);
        }
        if let Some(patch) = patch.embedding {
            self.embedding.merge(patch);
        }
        if let Some(patch) = patch.assets {
            self.assets.merge(patch);
        }
        if let Some(patch) = patch.logging {
            self.logging.merge(patch);
        }
        if let Some(interpreters) = patch.interpreters {
            for (name, policy) in interpreters {
                self.interpreters
                    .entry(name.to_lowercase())
                    .or_default()
                    .merge(policy);
            }
        }
    }

    fn apply_env_overrides<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env_usize(env, "ONEIRIC_MAX_RESULTS")? {
            self.retrieval.max_results = value;
        }
        if let Some(value) = env_f32(env, "ONEIRIC_SIMILARITY_THRESHOLD")? {
            self.retrieval.similarity_threshold = value;
        }
        if let Some(value) = env_f32(env, "ONEIRIC_QUALITY_FLOOR")? {
            self.retrieval.quality_floor = value;
        }
        if let Some(value) = env_usize(env, "ONEIRIC_MAX_CANDIDATES")? {
            self.retrieval.max_candidates = value;
        }
        if let Some(value) = env_bool(env, "ONEIRIC_INCLUDE_SYMBOLS") {
            self.retrieval.include_symbols = value;
        }
        if let Some(value) = env_bool(env, "ONEIRIC_ADAPTIVE_SCORING") {
            self.retrieval.adaptive_scoring = value;
        }
        if let Some(values) = env_list(env, "ONEIRIC_WEIGHTS") {
            self.retrieval.weights = parse_weights(&values)?;
        }

        if let Some(value) = env_f32(env, "ONEIRIC_BM25_AVG_DOC_LEN")? {
            self.bm25.avg_doc_len = value;
        }

        if let Some(value) = env_string(env, "ONEIRIC_DIVERSITY_MODE") {
            self.diversity.mode = DiversityMode::parse(&value).ok_or_else(|| {
                RagError::Config(format!("invalid ONEIRIC_DIVERSITY_MODE value {value}"))
            })?;
        }
        if let Some(value) = env_usize(env, "ONEIRIC_HISTORY_CAP")? {
            self.diversity.history_cap = value;
        }

        if let Some(value) = env_string(env, "ONEIRIC_EMBEDDING_BACKEND") {
            self.embedding.backend = value;
        }
        if let Some(value) = env_usize(env, "ONEIRIC_EMBEDDING_DIMS")? {
            self.embedding.dims = value;
        }
        if let Some(value) = env_string(env, "ONEIRIC_EMBEDDING_URL") {
            self.embedding.api_url = Some(value);
        }
        if let Some(value) = env_string(env, "ONEIRIC_EMBEDDING_MODEL") {
            self.embedding.api_model = value;
        }
        if let Some(value) = env_u64(env, "ONEIRIC_EMBEDDING_TIMEOUT_MS")? {
            self.embedding.timeout_ms = value;
        }
        if let Some(value) = env_bool(env, "ONEIRIC_EMBEDDING_SPARSE") {
            self.embedding.sparse = value;
        }

        if let Some(value) = env_string(env, "ONEIRIC_THEMES_PATH") {
            self.assets.themes = Some(PathBuf::from(value));
        }
        if let Some(value) = env_string(env, "ONEIRIC_LEXICON_PATH") {
            self.assets.lexicon = Some(PathBuf::from(value));
        }

        if let Some(value) = env_string(env, "ONEIRIC_LOG_FORMAT") {
            self.logging.format = value;
        }
        if let Some(value) = env_string(env, "ONEIRIC_LOG_LEVEL") {
            self.logging.level = value;
        }

        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if !(-1.0..=1.0).contains(&r.similarity_threshold) {
            return Err(RagError::Config(format!(
                "retrieval.similarity_threshold must be within [-1, 1], got {}",
                r.similarity_threshold
            )));
        }
        if !r.quality_floor.is_finite() || r.quality_floor < 0.0 {
            return Err(RagError::Config(format!(
                "retrieval.quality_floor must be finite and non-negative, got {}",
                r.quality_floor
            )));
        }
        if !(0.0..=1.0).contains(&r.min_query_overlap) {
            return Err(RagError::Config(format!(
                "retrieval.min_query_overlap must be within [0, 1], got {}",
                r.min_query_overlap
            )));
        }
        if r.candidate_multiplier == 0 || r.max_candidates == 0 {
            return Err(RagError::Config(
                "retrieval.candidate_multiplier and retrieval.max_candidates must be at least 1"
                    .to_string(),
            ));
        }
        r.weights
            .validate()
            .map_err(|err| RagError::Config(format!("retrieval.weights: {err}")))?;

        let bm25 = &self.bm25;
        if !bm25.k1.is_finite()
            || bm25.k1 < 0.0
            || !(0.0..=1.0).contains(&bm25.b)
            || !bm25.avg_doc_len.is_finite()
            || bm25.avg_doc_len <= 0.0
        {
            return Err(RagError::Config(
                "bm25 requires k1 >= 0, b within [0, 1] and avg_doc_len > 0".to_string(),
            ));
        }

        if self.diversity.history_cap == 0 || self.diversity.max_per_source == 0 {
            return Err(RagError::Config(
                "diversity.history_cap and diversity.max_per_source must be at least 1".to_string(),
            ));
        }

        if self.embedding.dims == 0 {
            return Err(RagError::Config(
                "embedding.dims must be greater than 0".to_string(),
            ));
        }

        for (name, policy) in &self.interpreters {
            if Interpreter::parse(name).is_none() {
                return Err(RagError::Config(format!("unknown interpreter section: {name}")));
            }
            if let Some(weights) = &policy.weights {
                weights
                    .validate()
                    .map_err(|err| RagError::Config(format!("interpreters.{name}.weights: {err}")))?;
            }
            if let Some(floor) = policy.quality_floor {
                if !floor.is_finite() || floor < 0.0 {
                    return Err(RagError::Config(format!(
                        "interpreters.{name}.quality_floor must be finite and non-negative, got {floor}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Policy override for an interpreter, if configured
    pub fn policy_for(&self, interpreter: Interpreter) -> Option<&InterpreterPolicy> {
        self.interpreters.iter().find_map(|(name, policy)| {
            (Interpreter::parse(name) == Some(interpreter)).then_some(policy)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub max_results: usize,
    /// Minimum dense cosine similarity for semantic candidates
    pub similarity_threshold: f32,
    /// Hybrid scores must exceed this to be returned
    pub quality_floor: f32,
    /// Candidates without a semantic signal need this share of query terms
    pub min_query_overlap: f32,
    /// Per-arm candidate limit is `max(max_results * multiplier, min_candidates)`,
    /// capped at `max_candidates`
    pub candidate_multiplier: usize,
    pub min_candidates: usize,
    pub max_candidates: usize,
    pub adaptive_scoring: bool,
    pub include_symbols: bool,
    /// Restrict semantic candidates to fragments matching the query themes
    pub theme_prefilter: bool,
    pub min_association_similarity: f32,
    pub weights: SignalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            similarity_threshold: 0.3,
            quality_floor: 0.2,
            min_query_overlap: 0.2,
            candidate_multiplier: 4,
            min_candidates: 20,
            max_candidates: 500,
            adaptive_scoring: true,
            include_symbols: true,
            theme_prefilter: false,
            min_association_similarity: 0.5,
            weights: SignalWeights::default(),
        }
    }
}

impl RetrievalConfig {
    fn merge(&mut self, patch: RetrievalPatch) {
        if let Some(value) = patch.max_results {
            self.max_results = value;
        }
        if let Some(value) = patch.similarity_threshold {
            self.similarity_threshold = value;
        }
        if let Some(value) = patch.quality_floor {
            self.quality_floor = value;
        }
        if let Some(value) = patch.min_query_overlap {
            self.min_query_overlap = value;
        }
        if let Some(value) = patch.candidate_multiplier {
            self.candidate_multiplier = value;
        }
        if let Some(value) = patch.min_candidates {
            self.min_candidates = value;
        }
        if let Some(value) = patch.max_candidates {
            self.max_candidates = value;
        }
        if let Some(value) = patch.adaptive_scoring {
            self.adaptive_scoring = value;
        }
        if let Some(value) = patch.include_symbols {
            self.include_symbols = value;
        }
        if let Some(value) = patch.theme_prefilter {
            self.theme_prefilter = value;
        }
        if let Some(value) = patch.min_association_similarity {
            self.min_association_similarity = value;
        }
        if let Some(value) = patch.weights {
            self.weights = value;
        }
    }

    /// Candidate limit for each retrieval arm
    pub fn candidate_limit(&self, max_results: usize) -> usize {
        max_results
            .saturating_mul(self.candidate_multiplier)
            .max(self.min_candidates)
            .min(self.max_candidates)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f32,
    pub b: f32,
    /// Used when the lexical backend reports no corpus statistics
    pub avg_doc_len: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_doc_len: 120.0,
        }
    }
}

impl Bm25Config {
    fn merge(&mut self, patch: Bm25Patch) {
        if let Some(value) = patch.k1 {
            self.k1 = value;
        }
        if let Some(value) = patch.b {
            self.b = value;
        }
        if let Some(value) = patch.avg_doc_len {
            self.avg_doc_len = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    /// Bonus for the first matching theme code
    pub theme_match: f32,
    /// Bonus per additional matching theme code
    pub theme_match_step: f32,
    pub theme_match_cap: f32,
    pub hint_overlap: f32,
    pub preferred_source: f32,
    pub content_multipliers: ContentMultipliers,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            theme_match: 0.10,
            theme_match_step: 0.025,
            theme_match_cap: 0.15,
            hint_overlap: 0.05,
            preferred_source: 0.10,
            content_multipliers: ContentMultipliers::default(),
        }
    }
}

impl BoostConfig {
    fn merge(&mut self, patch: BoostPatch) {
        if let Some(value) = patch.theme_match {
            self.theme_match = value;
        }
        if let Some(value) = patch.theme_match_step {
            self.theme_match_step = value;
        }
        if let Some(value) = patch.theme_match_cap {
            self.theme_match_cap = value;
        }
        if let Some(value) = patch.hint_overlap {
            self.hint_overlap = value;
        }
        if let Some(value) = patch.preferred_source {
            self.preferred_source = value;
        }
        if let Some(value) = patch.content_multipliers {
            self.content_multipliers = value;
        }
    }
}

/// Multiplicative bonus per content type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentMultipliers {
    pub theory: f32,
    pub example: f32,
    pub case_study: f32,
    pub definition: f32,
    pub commentary: f32,
}

impl Default for ContentMultipliers {
    fn default() -> Self {
        Self {
            theory: 1.0,
            example: 1.15,
            case_study: 1.12,
            definition: 1.05,
            commentary: 1.0,
        }
    }
}

impl ContentMultipliers {
    pub const fn for_type(&self, content_type: ContentType) -> f32 {
        match content_type {
            ContentType::Theory => self.theory,
            ContentType::Example => self.example,
            ContentType::CaseStudy => self.case_study,
            ContentType::Definition => self.definition,
            ContentType::Commentary => self.commentary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    pub mode: DiversityMode,
    /// Picks remembered per interpreter
    pub history_cap: usize,
    /// Persona-greedy hard cap on picks from one source
    pub max_per_source: usize,
    pub unseen_source_bonus: f32,
    pub unseen_section_bonus: f32,
    pub same_section_penalty: f32,
    pub recent_penalty: f32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            mode: DiversityMode::BalancedDiverse,
            history_cap: 50,
            max_per_source: 2,
            unseen_source_bonus: 0.15,
            unseen_section_bonus: 0.05,
            same_section_penalty: 0.10,
            recent_penalty: 0.20,
        }
    }
}

impl DiversityConfig {
    fn merge(&mut self, patch: DiversityPatch) {
        if let Some(value) = patch.mode {
            self.mode = value;
        }
        if let Some(value) = patch.history_cap {
            self.history_cap = value;
        }
        if let Some(value) = patch.max_per_source {
            self.max_per_source = value;
        }
        if let Some(value) = patch.unseen_source_bonus {
            self.unseen_source_bonus = value;
        }
        if let Some(value) = patch.unseen_section_bonus {
            self.unseen_section_bonus = value;
        }
        if let Some(value) = patch.same_section_penalty {
            self.same_section_penalty = value;
        }
        if let Some(value) = patch.recent_penalty {
            self.recent_penalty = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `hash` or `api`
    pub backend: String,
    pub dims: usize,
    /// Emit sparse token weights alongside the dense vector
    pub sparse: bool,
    pub api_url: Option<String>,
    pub api_model: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
    /// Query-embedding LRU size; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "hash".to_string(),
            dims: 384,
            sparse: true,
            api_url: None,
            api_model: "text-embedding-3-small".to_string(),
            api_key_env: Some("ONEIRIC_EMBEDDING_API_KEY".to_string()),
            timeout_ms: 10_000,
            cache_capacity: 256,
        }
    }
}

impl EmbeddingConfig {
    fn merge(&mut self, patch: EmbeddingPatch) {
        if let Some(value) = patch.backend {
            self.backend = value;
        }
        if let Some(value) = patch.dims {
            self.dims = value;
        }
        if let Some(value) = patch.sparse {
            self.sparse = value;
        }
        if let Some(value) = patch.api_url {
            self.api_url = Some(value);
        }
        if let Some(value) = patch.api_model {
            self.api_model = value;
        }
        if let Some(value) = patch.api_key_env {
            self.api_key_env = Some(value);
        }
        if let Some(value) = patch.timeout_ms {
            self.timeout_ms = value;
        }
        if let Some(value) = patch.cache_capacity {
            self.cache_capacity = value;
        }
    }
}

/// Asset overrides; the embedded copies are used when unset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    pub themes: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
}

impl AssetsConfig {
    fn merge(&mut self, patch: AssetsPatch) {
        if let Some(value) = patch.themes {
            self.themes = Some(value);
        }
        if let Some(value) = patch.lexicon {
            self.lexicon = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    pub format: String,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, patch: LoggingPatch) {
        if let Some(value) = patch.format {
            self.format = value;
        }
        if let Some(value) = patch.level {
            self.level = value;
        }
    }
}

/// Per-interpreter defaults layered between the config and the request options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterpreterPolicy {
    pub diversity_mode: Option<DiversityMode>,
    pub weights: Option<SignalWeights>,
    pub adaptive_scoring: Option<bool>,
    pub quality_floor: Option<f32>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
}

impl InterpreterPolicy {
    fn merge(&mut self, patch: InterpreterPolicyPatch) {
        if let Some(value) = patch.diversity_mode {
            self.diversity_mode = Some(value);
        }
        if let Some(value) = patch.weights {
            self.weights = Some(value);
        }
        if let Some(value) = patch.adaptive_scoring {
            self.adaptive_scoring = Some(value);
        }
        if let Some(value) = patch.quality_floor {
            self.quality_floor = Some(value);
        }
        if let Some(value) = patch.preferred_sources {
            self.preferred_sources = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub retrieval: Option<RetrievalPatch>,
    pub bm25: Option<Bm25Patch>,
    pub boost: Option<BoostPatch>,
    pub diversity: Option<DiversityPatch>,
    pub embedding: Option<EmbeddingPatch>,
    pub assets: Option<AssetsPatch>,
    pub logging: Option<LoggingPatch>,
    pub interpreters: Option<BTreeMap<String, InterpreterPolicyPatch>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RetrievalPatch {
    pub max_results: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub quality_floor: Option<f32>,
    pub min_query_overlap: Option<f32>,
    pub candidate_multiplier: Option<usize>,
    pub min_candidates: Option<usize>,
    pub max_candidates: Option<usize>,
    pub adaptive_scoring: Option<bool>,
    pub include_symbols: Option<bool>,
    pub theme_prefilter: Option<bool>,
    pub min_association_similarity: Option<f32>,
    pub weights: Option<SignalWeights>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Bm25Patch {
    pub k1: Option<f32>,
    pub b: Option<f32>,
    pub avg_doc_len: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BoostPatch {
    pub theme_match: Option<f32>,
    pub theme_match_step: Option<f32>,
    pub theme_match_cap: Option<f32>,
    pub hint_overlap: Option<f32>,
    pub preferred_source: Option<f32>,
    pub content_multipliers: Option<ContentMultipliers>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DiversityPatch {
    pub mode: Option<DiversityMode>,
    pub history_cap: Option<usize>,
    pub max_per_source: Option<usize>,
    pub unseen_source_bonus: Option<f32>,
    pub unseen_section_bonus: Option<f32>,
    pub same_section_penalty: Option<f32>,
    pub recent_penalty: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EmbeddingPatch {
    pub backend: Option<String>,
    pub dims: Option<usize>,
    pub sparse: Option<bool>,
    pub api_url: Option<String>,
    pub api_model: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_ms: Option<u64>,
    pub cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AssetsPatch {
    pub themes: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LoggingPatch {
    pub format: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct InterpreterPolicyPatch {
    pub diversity_mode: Option<DiversityMode>,
    pub weights: Option<SignalWeights>,
    pub adaptive_scoring: Option<bool>,
    pub quality_floor: Option<f32>,
    pub preferred_sources: Option<Vec<String>>,
}

fn parse_weights(values: &[String]) -> Result<SignalWeights> {
    let parsed = values
        .iter()
        .map(|v| {
            v.parse::<f32>()
                .map_err(|err| RagError::Config(format!("invalid ONEIRIC_WEIGHTS entry {v}: {err}")))
        })
        .collect::<Result<Vec<_>>>()?;
    match parsed.as_slice() {
        [semantic, sparse, lexical] => Ok(SignalWeights::new(*semantic, *sparse, *lexical)),
        _ => Err(RagError::Config(format!(
            "ONEIRIC_WEIGHTS expects semantic,sparse,lexical; got {} values",
            parsed.len()
        ))),
    }
}

fn env_string<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Option<String> {
    env(key).filter(|value| !value.trim().is_empty())
}

fn env_bool<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Option<bool> {
    env(key).map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Result<Option<usize>> {
    env_parse(env, key)
}

fn env_u64<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Result<Option<u64>> {
    env_parse(env, key)
}

fn env_f32<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Result<Option<f32>> {
    env_parse(env, key)
}

fn env_parse<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|err| {
            RagError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        None => Ok(None),
    }
}

fn env_list<F: Fn(&str) -> Option<String>>(env: &F, key: &str) -> Option<Vec<String>> {
    env(key).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn config_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.max_results, 5);
        assert!((config.retrieval.quality_floor - 0.2).abs() < f32::EPSILON);
        assert!((config.bm25.k1 - 1.2).abs() < f32::EPSILON);
        assert!((config.bm25.b - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.diversity.mode, DiversityMode::BalancedDiverse);
        assert_eq!(config.embedding.backend, "hash");
    }

    #[test]
    fn content_multipliers_default_order() {
        let m = ContentMultipliers::default();
        assert!(m.for_type(ContentType::Example) > m.for_type(ContentType::CaseStudy));
        assert!(m.for_type(ContentType::CaseStudy) > m.for_type(ContentType::Definition));
        assert!(m.for_type(ContentType::Definition) > m.for_type(ContentType::Theory));
    }

    #[test]
    fn candidate_limit_has_floor() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.candidate_limit(1), 20);
        assert_eq!(retrieval.candidate_limit(10), 40);
        assert_eq!(retrieval.candidate_limit(usize::MAX / 8), 500);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.retrieval.max_results, config.retrieval.max_results);
        assert_eq!(back.diversity.mode, config.diversity.mode);
    }

    // =========================================================================
    // Patches
    // =========================================================================

    #[test]
    fn from_toml_merges_sections() {
        let config = Config::from_toml_str(
            r#"
[retrieval]
max_results = 8
weights = { semantic = 0.6, sparse = 0.1, lexical = 0.3 }

[diversity]
mode = "persona_greedy"

[boost.content_multipliers]
example = 1.3

[interpreters.jung]
diversity_mode = "top_similarity"
preferred_sources = ["Man and His Symbols"]
"#,
        )
        .unwrap();

        assert_eq!(config.retrieval.max_results, 8);
        assert!((config.retrieval.weights.semantic - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.similarity_threshold, 0.3);
        assert_eq!(config.diversity.mode, DiversityMode::PersonaGreedy);
        assert!((config.boost.content_multipliers.example - 1.3).abs() < f32::EPSILON);
        assert!((config.boost.content_multipliers.case_study - 1.12).abs() < f32::EPSILON);

        let jung = config.policy_for(Interpreter::Jung).unwrap();
        assert_eq!(jung.diversity_mode, Some(DiversityMode::TopSimilarity));
        assert_eq!(jung.preferred_sources, vec!["Man and His Symbols"]);
        assert!(config.policy_for(Interpreter::Freud).is_none());
    }

    #[test]
    fn unknown_interpreter_section_rejected() {
        let err = Config::from_toml_str("[interpreters.skinner]\nquality_floor = 0.1\n").unwrap_err();
        assert!(err.to_string().contains("unknown interpreter"));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(Config::from_toml_str("[retrieval]\nsimilarity_threshold = 1.5\n").is_err());
        assert!(Config::from_toml_str("[bm25]\nb = 2.0\n").is_err());
        assert!(Config::from_toml_str("[diversity]\nhistory_cap = 0\n").is_err());
        assert!(Config::from_toml_str("[retrieval]\nmax_candidates = 0\n").is_err());
        assert!(Config::from_toml_str("[bm25]\nk1 = nan\n").is_err());
        assert!(Config::from_toml_str("[bm25]\navg_doc_len = nan\n").is_err());
        assert!(Config::from_toml_str("[interpreters.jung]\nquality_floor = nan\n").is_err());
        assert!(Config::from_toml_str("[interpreters.freud]\nquality_floor = -0.1\n").is_err());
        assert!(
            Config::from_toml_str("[retrieval]\nweights = { semantic = -1.0, sparse = 0.0, lexical = 0.0 }\n")
                .is_err()
        );
    }

    #[test]
    fn load_patch_nonexistent_file() {
        let result = Config::load_patch(Path::new("/nonexistent/path/oneiric.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_patch_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("oneiric.toml");
        std::fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(Config::load_patch(&path).is_err());
    }

    // =========================================================================
    // Config::load (files + env)
    // =========================================================================

    #[test]
    fn load_from_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[retrieval]\nmax_results = 3\n").unwrap();

        let config = Config::load_with_env(Some(&path), temp.path(), no_env).unwrap();
        assert_eq!(config.retrieval.max_results, 3);
    }

    #[test]
    fn explicit_path_from_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("from_env.toml");
        std::fs::write(&path, "[bm25]\navg_doc_len = 64.0\n").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let env = env_from(&[("ONEIRIC_CONFIG", path_str.as_str())]);
        let config = Config::load_with_env(None, temp.path(), env).unwrap();
        assert!((config.bm25.avg_doc_len - 64.0).abs() < f32::EPSILON);
    }

    #[test]
    fn env_overrides_project_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(PROJECT_CONFIG_FILE),
            "[retrieval]\nmax_results = 7\nquality_floor = 0.3\n",
        )
        .unwrap();

        let env = env_from(&[
            ("ONEIRIC_MAX_RESULTS", "9"),
            ("ONEIRIC_DIVERSITY_MODE", "weighted_random"),
            ("ONEIRIC_WEIGHTS", "0.4, 0.2, 0.4"),
            ("ONEIRIC_ADAPTIVE_SCORING", "false"),
        ]);
        let config = Config::load_with_env(None, temp.path(), env).unwrap();
        assert_eq!(config.retrieval.max_results, 9);
        assert!((config.retrieval.quality_floor - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.diversity.mode, DiversityMode::WeightedRandom);
        assert_eq!(config.retrieval.weights, SignalWeights::new(0.4, 0.2, 0.4));
        assert!(!config.retrieval.adaptive_scoring);
    }

    #[test]
    fn invalid_env_values_rejected() {
        let temp = TempDir::new().unwrap();
        let bad_number = env_from(&[("ONEIRIC_MAX_RESULTS", "many")]);
        assert!(Config::load_with_env(None, temp.path(), bad_number).is_err());

        let bad_mode = env_from(&[("ONEIRIC_DIVERSITY_MODE", "chaotic")]);
        assert!(Config::load_with_env(None, temp.path(), bad_mode).is_err());

        let bad_weights = env_from(&[("ONEIRIC_WEIGHTS", "0.5,0.5")]);
        assert!(Config::load_with_env(None, temp.path(), bad_weights).is_err());
    }

    #[test]
    fn load_with_no_files_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let explicit = temp.path().join("missing.toml");
        let config = Config::load_with_env(Some(&explicit), temp.path(), no_env).unwrap();
        assert_eq!(config.retrieval.max_results, 5);
    }

    #[test]
    fn env_bool_values() {
        let env = env_from(&[("A", "yes"), ("B", "0"), ("C", "TRUE")]);
        assert_eq!(env_bool(&env, "A"), Some(true));
        assert_eq!(env_bool(&env, "B"), Some(false));
        assert_eq!(env_bool(&env, "C"), Some(true));
        assert_eq!(env_bool(&env, "D"), None);
    }
}
