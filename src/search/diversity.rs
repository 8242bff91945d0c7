//! Diversity-aware top-K selection
//!
//! Every mode keeps the highest-scoring candidate first, then fills the
//! remaining slots under its own policy:
//!
//! - [`DiversityMode::TopSimilarity`]: plain score order
//! - [`DiversityMode::BalancedDiverse`]: a third of the slots by score, the
//!   rest round-robin over (source, section) buckets
//! - [`DiversityMode::WeightedRandom`]: top two, then sampling ∝ score²
//! - [`DiversityMode::PersonaGreedy`]: greedy re-scoring against what this
//!   persona has already been shown
//!
//! [`DiversityTracker`] holds the bounded per-persona history the greedy mode
//! reads. The retriever records every successful selection into it.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::DiversityConfig;
use crate::core::fragment::Interpreter;
use crate::search::fusion::ScoredCandidate;

/// Number of leading picks weighted-random mode keeps by score
const WEIGHTED_RANDOM_KEEP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversityMode {
    TopSimilarity,
    #[default]
    #[serde(alias = "balanced")]
    BalancedDiverse,
    #[serde(alias = "similarity_weighted_random")]
    WeightedRandom,
    #[serde(alias = "persona_greedy_diversity")]
    PersonaGreedy,
}

impl DiversityMode {
    pub const ALL: [Self; 4] = [
        Self::TopSimilarity,
        Self::BalancedDiverse,
        Self::WeightedRandom,
        Self::PersonaGreedy,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "top_similarity" | "top" => Some(Self::TopSimilarity),
            "balanced_diverse" | "balanced" => Some(Self::BalancedDiverse),
            "weighted_random" | "similarity_weighted_random" | "random" => {
                Some(Self::WeightedRandom)
            }
            "persona_greedy" | "persona_greedy_diversity" | "greedy" => Some(Self::PersonaGreedy),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TopSimilarity => "top_similarity",
            Self::BalancedDiverse => "balanced_diverse",
            Self::WeightedRandom => "weighted_random",
            Self::PersonaGreedy => "persona_greedy",
        }
    }
}

impl std::fmt::Display for DiversityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment returned to a persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityPick {
    pub fragment_id: String,
    pub source: String,
    pub section: Option<String>,
    pub returned_at: DateTime<Utc>,
}

impl DiversityPick {
    pub fn from_candidate(candidate: &ScoredCandidate, returned_at: DateTime<Utc>) -> Self {
        Self {
            fragment_id: candidate.id().to_string(),
            source: candidate.source().to_string(),
            section: candidate.section().map(str::to_string),
            returned_at,
        }
    }
}

/// Bounded rolling history of picks per interpreter persona
#[derive(Debug)]
pub struct DiversityTracker {
    cap: usize,
    history: Mutex<HashMap<Interpreter, VecDeque<DiversityPick>>>,
}

impl DiversityTracker {
    /// A cap of 0 is treated as 1
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Append picks, evicting the oldest beyond the cap
    pub fn record(&self, interpreter: Interpreter, picks: impl IntoIterator<Item = DiversityPick>) {
        let mut history = self.history.lock();
        let entries = history.entry(interpreter).or_default();
        entries.extend(picks);
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// Snapshot of the persona's history, oldest first
    pub fn recent(&self, interpreter: Interpreter) -> Vec<DiversityPick> {
        self.history
            .lock()
            .get(&interpreter)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, interpreter: Interpreter) -> usize {
        self.history.lock().get(&interpreter).map_or(0, VecDeque::len)
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }
}

/// Per-call selection inputs
pub struct SelectionContext<'a> {
    pub config: &'a DiversityConfig,
    /// Persona history, used by the greedy mode
    pub history: &'a [DiversityPick],
    pub rng: &'a mut dyn RngCore,
}

/// Select up to `k` candidates from a pool sorted by descending score
pub fn select(
    mode: DiversityMode,
    pool: Vec<ScoredCandidate>,
    k: usize,
    ctx: &mut SelectionContext<'_>,
) -> Vec<ScoredCandidate> {
    if k == 0 || pool.is_empty() {
        return Vec::new();
    }
    let k = k.min(pool.len());

    match mode {
        DiversityMode::TopSimilarity => pool.into_iter().take(k).collect(),
        DiversityMode::BalancedDiverse => balanced(pool, k),
        DiversityMode::WeightedRandom => weighted_random(pool, k, ctx.rng),
        DiversityMode::PersonaGreedy => persona_greedy(pool, k, ctx.config, ctx.history),
    }
}

fn balanced(pool: Vec<ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
    let reserved = k.div_ceil(3).max(1);
    let mut iter = pool.into_iter();
    let mut picked: Vec<ScoredCandidate> = iter.by_ref().take(reserved).collect();

    // buckets in order of their best remaining candidate
    let mut order: Vec<(String, Option<String>)> = Vec::new();
    let mut buckets: HashMap<(String, Option<String>), VecDeque<ScoredCandidate>> = HashMap::new();
    for candidate in iter {
        let key = (
            candidate.source().to_string(),
            candidate.section().map(str::to_string),
        );
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push_back(candidate);
    }

    while picked.len() < k {
        let represented: HashSet<String> = picked.iter().map(|c| c.source().to_string()).collect();
        let (fresh, seen): (Vec<_>, Vec<_>) = order
            .iter()
            .filter(|key| buckets.get(*key).is_some_and(|b| !b.is_empty()))
            .partition(|(source, _)| !represented.contains(source));
        if fresh.is_empty() && seen.is_empty() {
            break;
        }

        for key in fresh.into_iter().chain(seen) {
            if picked.len() >= k {
                break;
            }
            if let Some(candidate) = buckets.get_mut(key).and_then(VecDeque::pop_front) {
                picked.push(candidate);
            }
        }
    }

    picked
}

fn weighted_random(
    pool: Vec<ScoredCandidate>,
    k: usize,
    rng: &mut dyn RngCore,
) -> Vec<ScoredCandidate> {
    let keep = WEIGHTED_RANDOM_KEEP.min(k);
    let mut remaining = pool;
    let mut picked: Vec<ScoredCandidate> = remaining.drain(..keep).collect();

    while picked.len() < k && !remaining.is_empty() {
        let weights: Vec<f32> = remaining
            .iter()
            .map(|c| (c.hybrid * c.hybrid).max(f32::MIN_POSITIVE))
            .collect();
        let total: f32 = weights.iter().sum();
        let mut target = rng.random::<f32>() * total;

        let mut index = remaining.len() - 1;
        for (i, weight) in weights.iter().enumerate() {
            if target < *weight {
                index = i;
                break;
            }
            target -= weight;
        }
        picked.push(remaining.remove(index));
    }

    picked
}

fn persona_greedy(
    pool: Vec<ScoredCandidate>,
    k: usize,
    config: &DiversityConfig,
    history: &[DiversityPick],
) -> Vec<ScoredCandidate> {
    let recent_ids: HashSet<&str> = history.iter().map(|p| p.fragment_id.as_str()).collect();
    let history_sources: HashSet<&str> = history.iter().map(|p| p.source.as_str()).collect();
    let history_sections: HashSet<&str> =
        history.iter().filter_map(|p| p.section.as_deref()).collect();

    let mut remaining = pool;
    let mut picked = vec![remaining.remove(0)];

    while picked.len() < k {
        let mut per_source: HashMap<&str, usize> = HashMap::new();
        for pick in &picked {
            *per_source.entry(pick.source()).or_insert(0) += 1;
        }
        let picked_sections: HashSet<&str> = picked.iter().filter_map(ScoredCandidate::section).collect();

        let best = remaining
            .iter()
            .enumerate()
            .filter(|(_, c)| per_source.get(c.source()).copied().unwrap_or(0) < config.max_per_source)
            .map(|(i, c)| {
                let mut adjusted = c.hybrid;
                if !per_source.contains_key(c.source()) && !history_sources.contains(c.source()) {
                    adjusted += config.unseen_source_bonus;
                }
                if let Some(section) = c.section() {
                    if !picked_sections.contains(section) && !history_sections.contains(section) {
                        adjusted += config.unseen_section_bonus;
                    }
                }
                if c.section().is_some()
                    && picked
                        .iter()
                        .any(|p| p.source() == c.source() && p.section() == c.section())
                {
                    adjusted -= config.same_section_penalty;
                }
                if recent_ids.contains(c.id()) {
                    adjusted -= config.recent_penalty;
                }
                (i, adjusted)
            })
            .max_by(|(ia, a), (ib, b)| {
                a.total_cmp(b)
                    .then_with(|| remaining[*ia].hybrid.total_cmp(&remaining[*ib].hybrid))
                    .then_with(|| remaining[*ib].id().cmp(remaining[*ia].id()))
            })
            .map(|(i, _)| i);

        match best {
            Some(index) => {
                let candidate = remaining.remove(index);
                picked.push(candidate);
            }
            None => break,
        }
    }

    picked
}
