//! Hybrid retrieval orchestration
//!
//! [`HybridRetriever::search`] runs the whole pipeline for one dream
//! narrative:
//!
//! 1. validate options (metadata filter, weights, threshold)
//! 2. analyse the query for themes, hints and keywords
//! 3. resolve weights, diversity mode and quality floor from the request,
//!    the interpreter policy and the config, in that order of precedence
//! 4. run the lexical and semantic arms concurrently
//! 5. merge, exclude, fuse, quality-filter and select a diverse top-K
//! 6. record the picks in the persona's diversity history
//! 7. extract symbols and theme labels from the selected passages

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::core::fragment::{FragmentMetadata, Interpreter};
use crate::core::theme::ThemeVocabulary;
use crate::error::{RagError, Result};
use crate::lexicon::SymbolLexicon;
use crate::search::diversity::{
    self, DiversityMode, DiversityPick, DiversityTracker, SelectionContext,
};
use crate::search::embeddings::{EmbeddingProvider, build_embedder};
use crate::search::filters::{Exclusions, MetadataFilter};
use crate::search::fusion::{self, FusionContext, ScoredCandidate, SignalScores};
use crate::search::lexical::{Bm25Params, LexicalBackend, LexicalSearcher};
use crate::search::query::{QueryAnalysis, QueryAnalyzer};
use crate::search::semantic::{SemanticParams, SemanticSearcher};
use crate::search::symbols::{SymbolExtractor, SymbolInterpretation};
use crate::search::vector::VectorStore;
use crate::search::weights::{AdaptiveWeighting, SignalWeights, WeightProfile};

/// Boost switches and extra boost inputs for one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoostOptions {
    /// Additive theme, hint and preferred-source bonuses
    pub enabled: bool,
    /// Multiplicative content-type bonus
    pub content_type_bonus: bool,
    pub preferred_sources: Vec<String>,
    /// Theme codes to boost in addition to those found in the query
    pub theme_codes: Vec<String>,
}

impl Default for BoostOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            content_type_bonus: true,
            preferred_sources: Vec::new(),
            theme_codes: Vec::new(),
        }
    }
}

/// Per-call search options.
///
/// `None` fields fall back to the interpreter policy, then to the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub max_results: Option<usize>,
    #[serde(alias = "interpreterType")]
    pub interpreter: Interpreter,
    pub similarity_threshold: Option<f32>,
    pub include_symbols: Option<bool>,
    pub diversity_mode: Option<DiversityMode>,
    /// Fixed weights. Supplying them turns adaptive scoring off unless
    /// `adaptive_scoring` is set explicitly.
    pub weights: Option<SignalWeights>,
    pub metadata_filter: Option<Value>,
    pub boost: BoostOptions,
    pub exclude_ids: Vec<String>,
    pub exclude_sources: Vec<String>,
    pub adaptive_scoring: Option<bool>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: None,
            interpreter: Interpreter::Jung,
            similarity_threshold: None,
            include_symbols: None,
            diversity_mode: None,
            weights: None,
            metadata_filter: None,
            boost: BoostOptions::default(),
            exclude_ids: Vec::new(),
            exclude_sources: Vec::new(),
            adaptive_scoring: None,
        }
    }
}

impl SearchOptions {
    pub fn for_interpreter(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    #[must_use]
    pub const fn with_diversity_mode(mut self, mode: DiversityMode) -> Self {
        self.diversity_mode = Some(mode);
        self
    }

    #[must_use]
    pub const fn with_weights(mut self, weights: SignalWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    #[must_use]
    pub const fn with_adaptive_scoring(mut self, adaptive: bool) -> Self {
        self.adaptive_scoring = Some(adaptive);
        self
    }

    #[must_use]
    pub const fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_metadata_filter(mut self, filter: Value) -> Self {
        self.metadata_filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn with_symbols(mut self, include: bool) -> Self {
        self.include_symbols = Some(include);
        self
    }
}

/// One selected passage with its score breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedFragment {
    /// 1-based position in the result
    pub rank: usize,
    pub id: String,
    pub content: String,
    pub metadata: FragmentMetadata,
    pub scores: SignalScores,
    pub theme_boost: f32,
    pub content_multiplier: f32,
    pub hybrid_score: f32,
    pub matched_themes: Vec<String>,
}

impl RankedFragment {
    fn from_scored(rank: usize, scored: ScoredCandidate) -> Self {
        Self {
            rank,
            id: scored.candidate.fragment_id,
            content: scored.candidate.content,
            metadata: scored.candidate.metadata,
            scores: scored.scores,
            theme_boost: scored.theme_boost,
            content_multiplier: scored.content_multiplier,
            hybrid_score: scored.hybrid,
            matched_themes: scored.matched_themes,
        }
    }
}

/// How a search went, for logging and for callers that want to know
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalDiagnostics {
    pub lexical_candidates: usize,
    pub semantic_candidates: usize,
    pub merged_candidates: usize,
    /// Removed by exclusions or the metadata filter
    pub excluded: usize,
    /// Removed by the quality filter
    pub filtered: usize,
    pub lexical_degraded: Option<String>,
    pub semantic_degraded: Option<String>,
    pub sparse_used: bool,
    pub weight_profile: Option<WeightProfile>,
    pub weights: Option<SignalWeights>,
    pub diversity_mode: Option<DiversityMode>,
    pub elapsed_ms: u64,
}

/// Retrieval output handed to prompt construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagContext {
    pub relevant_passages: Vec<RankedFragment>,
    pub symbols: Vec<SymbolInterpretation>,
    /// Theoretical labels found in the passages, then matched theme codes
    pub themes: Vec<String>,
    pub matched_theme_codes: Vec<String>,
    pub diagnostics: RetrievalDiagnostics,
}

impl RagContext {
    pub fn is_empty(&self) -> bool {
        self.relevant_passages.is_empty()
    }
}

/// Weights, mode and floor resolved for one call
#[derive(Debug, Clone)]
struct SearchPlan {
    weights: SignalWeights,
    profile: WeightProfile,
    mode: DiversityMode,
    quality_floor: f32,
    threshold: f32,
    preferred_sources: Vec<String>,
    theme_codes: Vec<String>,
}

/// The hybrid retrieval engine
pub struct HybridRetriever {
    config: Config,
    analyzer: QueryAnalyzer,
    adaptive: AdaptiveWeighting,
    lexical: LexicalSearcher,
    semantic: SemanticSearcher,
    symbols: SymbolExtractor,
    tracker: Arc<DiversityTracker>,
    rng: Mutex<StdRng>,
}

impl HybridRetriever {
    pub fn builder(config: Config) -> HybridRetrieverBuilder {
        HybridRetrieverBuilder::new(config)
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn tracker(&self) -> &Arc<DiversityTracker> {
        &self.tracker
    }

    /// Retrieve a ranked, diverse passage set for a dream narrative.
    ///
    /// # Errors
    ///
    /// - [`RagError::MalformedMetadataFilter`] and [`RagError::InvalidOptions`]
    ///   before any backend is called
    /// - [`RagError::EmbeddingUnavailable`] when the query cannot be embedded
    /// - a backend-unavailable variant when the failed arm was the only one
    ///   carrying weight
    pub async fn search(&self, query_text: &str, options: &SearchOptions) -> Result<RagContext> {
        let started = Instant::now();

        let filter = options
            .metadata_filter
            .as_ref()
            .map(MetadataFilter::from_json)
            .transpose()?;
        if let Some(weights) = &options.weights {
            weights.validate()?;
        }
        let threshold = options
            .similarity_threshold
            .unwrap_or(self.config.retrieval.similarity_threshold);
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(RagError::InvalidOptions(format!(
                "similarity_threshold must be within [-1, 1], got {threshold}"
            )));
        }

        let max_results = options
            .max_results
            .unwrap_or(self.config.retrieval.max_results);
        if max_results == 0 {
            debug!("max_results is 0, skipping retrieval");
            return Ok(RagContext::default());
        }

        let interpreter = options.interpreter;
        let analysis = self.analyzer.analyze(query_text, interpreter);
        let plan = self.plan(&analysis, options, threshold);
        debug!(
            interpreter = %interpreter,
            themes = ?analysis.theme_codes,
            keywords = analysis.keywords.len(),
            profile = ?plan.profile,
            mode = %plan.mode,
            "query analysed"
        );

        let limit = self.config.retrieval.candidate_limit(max_results);
        let prefilter = self.config.retrieval.theme_prefilter;
        let lexical_themes: &[String] = if prefilter { &plan.theme_codes } else { &[] };
        let semantic_params = SemanticParams {
            interpreter,
            threshold: plan.threshold,
            limit,
            theme_codes: plan.theme_codes.clone(),
            theme_prefilter: prefilter,
            min_association_similarity: self.config.retrieval.min_association_similarity,
            use_sparse: plan.weights.sparse > 0.0,
        };

        let lexical_arm = async {
            Ok::<_, RagError>(
                self.lexical
                    .search(query_text, interpreter, lexical_themes, limit)
                    .await,
            )
        };
        let semantic_arm = self.semantic.search(query_text, semantic_params);
        let (lexical, semantic) = tokio::try_join!(lexical_arm, semantic_arm)?;

        check_arms(
            lexical.degraded.as_deref(),
            semantic.degraded.as_deref(),
            &plan.weights,
        )?;

        let mut diagnostics = RetrievalDiagnostics {
            lexical_candidates: lexical.hits.len(),
            semantic_candidates: semantic.hits.len(),
            lexical_degraded: lexical.degraded,
            semantic_degraded: semantic.degraded,
            sparse_used: semantic.sparse_used,
            weight_profile: Some(plan.profile),
            weights: Some(plan.weights),
            diversity_mode: Some(plan.mode),
            ..RetrievalDiagnostics::default()
        };

        let merged = fusion::merge(lexical.hits, semantic.hits);
        diagnostics.merged_candidates = merged.len();

        let exclusions = Exclusions::new(&options.exclude_ids, &options.exclude_sources);
        let candidates: Vec<_> = merged
            .into_iter()
            .filter(|c| !exclusions.excludes(&c.fragment_id, &c.metadata))
            .filter(|c| filter.as_ref().is_none_or(|f| f.matches(&c.metadata)))
            .collect();
        diagnostics.excluded = diagnostics.merged_candidates - candidates.len();

        let hint_terms = analysis.hint_terms();
        let ctx = FusionContext {
            weights: plan.weights,
            query_terms: &analysis.keywords,
            theme_codes: &plan.theme_codes,
            hint_terms: &hint_terms,
            preferred_sources: &plan.preferred_sources,
            boost: &self.config.boost,
            apply_boosts: options.boost.enabled,
            apply_content_bonus: options.boost.content_type_bonus,
        };
        let scored = fusion::fuse(candidates, &ctx);
        let (pool, dropped) = fusion::quality_filter(
            scored,
            plan.quality_floor,
            self.config.retrieval.min_query_overlap,
        );
        diagnostics.filtered = dropped;

        let history = if plan.mode == DiversityMode::PersonaGreedy {
            self.tracker.recent(interpreter)
        } else {
            Vec::new()
        };
        let selected = {
            let mut rng = self.rng.lock();
            let mut selection = SelectionContext {
                config: &self.config.diversity,
                history: &history,
                rng: &mut *rng,
            };
            diversity::select(plan.mode, pool, max_results, &mut selection)
        };

        let now = Utc::now();
        self.tracker.record(
            interpreter,
            selected
                .iter()
                .map(|c| DiversityPick::from_candidate(c, now))
                .collect::<Vec<_>>(),
        );

        let mut matched_theme_codes = Vec::new();
        for candidate in &selected {
            for code in &candidate.matched_themes {
                if !matched_theme_codes.contains(code) {
                    matched_theme_codes.push(code.clone());
                }
            }
        }

        let passages: Vec<&str> = selected.iter().map(|c| c.candidate.content.as_str()).collect();
        let include_symbols = options
            .include_symbols
            .unwrap_or(self.config.retrieval.include_symbols);
        let symbols = if include_symbols {
            self.symbols.extract_symbols(query_text, interpreter, &passages)
        } else {
            Vec::new()
        };
        let mut themes = self.symbols.extract_themes(interpreter, &passages);
        for code in &matched_theme_codes {
            if !themes.contains(code) {
                themes.push(code.clone());
            }
        }

        let relevant_passages: Vec<RankedFragment> = selected
            .into_iter()
            .enumerate()
            .map(|(i, scored)| RankedFragment::from_scored(i + 1, scored))
            .collect();

        diagnostics.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            interpreter = %interpreter,
            results = relevant_passages.len(),
            lexical = diagnostics.lexical_candidates,
            semantic = diagnostics.semantic_candidates,
            filtered = diagnostics.filtered,
            symbols = symbols.len(),
            degraded = diagnostics.lexical_degraded.is_some() || diagnostics.semantic_degraded.is_some(),
            elapsed_ms = diagnostics.elapsed_ms,
            "hybrid search complete"
        );

        Ok(RagContext {
            relevant_passages,
            symbols,
            themes,
            matched_theme_codes,
            diagnostics,
        })
    }

    fn plan(&self, analysis: &QueryAnalysis, options: &SearchOptions, threshold: f32) -> SearchPlan {
        let retrieval = &self.config.retrieval;
        let policy = self.config.policy_for(options.interpreter);

        let adaptive = options
            .adaptive_scoring
            .or_else(|| options.weights.map(|_| false))
            .or_else(|| policy.and_then(|p| p.adaptive_scoring))
            .or_else(|| policy.and_then(|p| p.weights).map(|_| false))
            .unwrap_or(retrieval.adaptive_scoring);

        let (weights, profile) = if adaptive {
            self.adaptive.choose(&analysis.keywords)
        } else {
            let weights = options
                .weights
                .or_else(|| policy.and_then(|p| p.weights))
                .unwrap_or(retrieval.weights);
            (weights, WeightProfile::Fixed)
        };

        let mode = options
            .diversity_mode
            .or_else(|| policy.and_then(|p| p.diversity_mode))
            .unwrap_or(self.config.diversity.mode);

        let quality_floor = policy
            .and_then(|p| p.quality_floor)
            .unwrap_or(retrieval.quality_floor);

        let mut preferred_sources = options.boost.preferred_sources.clone();
        if let Some(policy) = policy {
            for source in &policy.preferred_sources {
                if !preferred_sources.contains(source) {
                    preferred_sources.push(source.clone());
                }
            }
        }

        let mut theme_codes = analysis.theme_codes.clone();
        for code in &options.boost.theme_codes {
            if !theme_codes.contains(code) {
                theme_codes.push(code.clone());
            }
        }

        SearchPlan {
            weights,
            profile,
            mode,
            quality_floor,
            threshold,
            preferred_sources,
            theme_codes,
        }
    }
}

/// Fail when the arms that are left carry no weight
fn check_arms(
    lexical_degraded: Option<&str>,
    semantic_degraded: Option<&str>,
    weights: &SignalWeights,
) -> Result<()> {
    match (lexical_degraded, semantic_degraded) {
        (Some(lexical), Some(semantic)) => Err(RagError::SemanticBackendUnavailable(format!(
            "both retrieval arms failed (lexical: {lexical}; semantic: {semantic})"
        ))),
        (Some(lexical), None) if weights.semantic_arm() <= 0.0 => {
            Err(RagError::LexicalBackendUnavailable(lexical.to_string()))
        }
        (None, Some(semantic)) if weights.lexical <= 0.0 => {
            Err(RagError::SemanticBackendUnavailable(semantic.to_string()))
        }
        _ => Ok(()),
    }
}

/// Assembles a [`HybridRetriever`] from config and collaborators
pub struct HybridRetrieverBuilder {
    config: Config,
    lexical: Option<Arc<dyn LexicalBackend>>,
    store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vocabulary: Option<Arc<ThemeVocabulary>>,
    lexicon: Option<Arc<SymbolLexicon>>,
    tracker: Option<Arc<DiversityTracker>>,
    seed: Option<u64>,
}

impl HybridRetrieverBuilder {
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            lexical: None,
            store: None,
            embedder: None,
            vocabulary: None,
            lexicon: None,
            tracker: None,
            seed: None,
        }
    }

    #[must_use]
    pub fn lexical_backend(mut self, backend: Arc<dyn LexicalBackend>) -> Self {
        self.lexical = Some(backend);
        self
    }

    #[must_use]
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`build_embedder`] over the embedding config
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn vocabulary(mut self, vocabulary: Arc<ThemeVocabulary>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    #[must_use]
    pub fn lexicon(mut self, lexicon: Arc<SymbolLexicon>) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    /// Share a tracker between retrievers; one is created from the config otherwise
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<DiversityTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Seed the weighted-random sampler
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<HybridRetriever> {
        self.config.validate()?;

        let lexical = self
            .lexical
            .ok_or_else(|| RagError::MissingConfig("lexical backend".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| RagError::MissingConfig("vector store".to_string()))?;
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => build_embedder(&self.config.embedding)?,
        };

        let vocabulary = match (self.vocabulary, &self.config.assets.themes) {
            (Some(vocabulary), _) => vocabulary,
            (None, Some(path)) => Arc::new(ThemeVocabulary::load(path)?),
            (None, None) => Arc::new(ThemeVocabulary::builtin()?),
        };
        let lexicon = match (self.lexicon, &self.config.assets.lexicon) {
            (Some(lexicon), _) => lexicon,
            (None, Some(path)) => Arc::new(SymbolLexicon::load(path)?),
            (None, None) => Arc::new(SymbolLexicon::builtin()?),
        };
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(DiversityTracker::new(self.config.diversity.history_cap)));
        let rng = self.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        let bm25 = Bm25Params {
            k1: self.config.bm25.k1,
            b: self.config.bm25.b,
            avg_doc_len: self.config.bm25.avg_doc_len,
        };

        debug!(
            lexical = lexical.name(),
            store = store.name(),
            embedder = embedder.name(),
            themes = vocabulary.len(),
            symbols = lexicon.symbols().len(),
            "hybrid retriever ready"
        );

        Ok(HybridRetriever {
            adaptive: AdaptiveWeighting::from_assets(&vocabulary, &lexicon),
            analyzer: QueryAnalyzer::new(vocabulary),
            lexical: LexicalSearcher::new(lexical, bm25),
            semantic: SemanticSearcher::new(embedder, store),
            symbols: SymbolExtractor::new(lexicon),
            tracker,
            rng: Mutex::new(rng),
            config: self.config,
        })
    }
}
