use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::warn;

use crate::cache::TtlCache;

/// Tuning for the similarity scorer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Minimum score [0,100] a candidate attribute must reach to match.
    pub threshold: u8,
    /// Per-candidate scoring budget. Exceeding it scores 0 and warns.
    pub timeout_ms: u64,
    pub case_sensitive: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 85,
            timeout_ms: 200,
            case_sensitive: false,
        }
    }
}

impl FuzzyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deterministic similarity scorer with a bounded per-pair cache.
///
/// Scoring rules, in order: identical strings score 100; one containing
/// the other scores 95; otherwise the score is the larger of token-set
/// similarity (Jaccard over word sets) and partial ratio (longest common
/// contiguous substring over the shorter string), scaled to [0,100].
/// Comparison is case-insensitive unless configured otherwise.
pub struct FuzzyMatcher {
    config: FuzzyConfig,
    cache: TtlCache<(String, String), u8>,
}

impl FuzzyMatcher {
    pub fn new(config: FuzzyConfig, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            config,
            cache: TtlCache::new(cache_capacity, cache_ttl),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FuzzyConfig::default(), 4096, Duration::from_secs(60))
    }

    pub fn config(&self) -> &FuzzyConfig {
        &self.config
    }

    /// Score `query` against `candidate` in [0,100].
    pub fn score(&self, query: &str, candidate: &str) -> u8 {
        let (q, c) = if self.config.case_sensitive {
            (query.to_string(), candidate.to_string())
        } else {
            (query.to_lowercase(), candidate.to_lowercase())
        };

        let key = (q.clone(), c.clone());
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let deadline = Instant::now() + self.config.timeout();
        let score = match score_pair(&q, &c, deadline) {
            Some(score) => score,
            None => {
                warn!(
                    query = %query,
                    candidate_len = candidate.len(),
                    budget_ms = self.config.timeout_ms,
                    "fuzzy scoring exceeded its budget"
                );
                return 0;
            }
        };

        self.cache.insert(key, score);
        score
    }

    /// True when the pair meets the configured threshold.
    pub fn matches(&self, query: &str, candidate: &str) -> bool {
        self.score(query, candidate) >= self.config.threshold
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> crate::CacheStats {
        self.cache.stats()
    }
}

fn score_pair(a: &str, b: &str, deadline: Instant) -> Option<u8> {
    if a == b {
        return Some(100);
    }
    if a.is_empty() || b.is_empty() {
        return Some(0);
    }
    if a.contains(b) || b.contains(a) {
        return Some(95);
    }

    let token = token_set_similarity(a, b);
    let partial = partial_ratio(a, b, deadline)?;
    Some((token.max(partial) * 100.0).round().min(100.0) as u8)
}

fn token_set_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Longest common contiguous substring as a fraction of the shorter
/// string, computed over chars with a rolling DP row. Checks the deadline
/// once per row so a pathological candidate cannot stall a search.
fn partial_ratio(a: &str, b: &str, deadline: Instant) -> Option<f64> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let shorter = a_chars.len().min(b_chars.len());
    if shorter == 0 {
        return Some(0.0);
    }

    let mut prev = vec![0usize; b_chars.len() + 1];
    let mut longest = 0usize;
    for (i, &ca) in a_chars.iter().enumerate() {
        if Instant::now() > deadline {
            return None;
        }
        let mut current = vec![0usize; b_chars.len() + 1];
        for (j, &cb) in b_chars.iter().enumerate() {
            if ca == cb {
                current[j + 1] = prev[j] + 1;
                longest = longest.max(current[j + 1]);
            }
        }
        prev = current;
    }

    Some(longest as f64 / shorter as f64)
}
