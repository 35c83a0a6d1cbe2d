use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use aura_core::TtlCache;

static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quoted-payload pattern")
});

const ACTION_VERBS: [&str; 8] = [
    "click", "press", "tap", "open", "launch", "activate", "select", "choose",
];

const FILLER_WORDS: [&str; 7] = ["the", "a", "an", "on", "in", "of", "to"];

/// What the search path should look for, derived from a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedTarget {
    pub target: String,
    pub confidence: f64,
}

/// Derives the element label to search for from a natural-language
/// command. Quoted payloads are returned verbatim (case preserved);
/// otherwise the command is lowercased, leading action verbs and filler
/// words are stripped, and trailing punctuation is dropped. Results are
/// cached by normalized command.
pub struct TargetExtractor {
    cache: TtlCache<String, Option<ExtractedTarget>>,
}

impl TargetExtractor {
    pub fn new(cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(cache_capacity, cache_ttl),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(256, Duration::from_secs(300))
    }

    pub fn extract(&self, command: &str) -> Option<ExtractedTarget> {
        let normalized = normalize(command);
        if let Some(cached) = self.cache.get(&normalized) {
            return cached;
        }
        let result = extract_uncached(command, &normalized);
        self.cache.insert(normalized, result.clone());
        result
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn normalize(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn extract_uncached(raw: &str, normalized: &str) -> Option<ExtractedTarget> {
    // A quoted payload is the target, verbatim.
    if let Some(captures) = QUOTED.captures(raw) {
        let payload = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim())?;
        if !payload.is_empty() {
            return Some(ExtractedTarget {
                target: payload.to_string(),
                confidence: 1.0,
            });
        }
    }

    let mut words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

    while let Some(first) = words.first() {
        if ACTION_VERBS.contains(first) {
            words.remove(0);
        } else {
            break;
        }
    }
    while let Some(first) = words.first() {
        if FILLER_WORDS.contains(first) {
            words.remove(0);
        } else {
            break;
        }
    }

    let target = words
        .join(" ")
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .trim()
        .to_string();
    if target.is_empty() {
        return None;
    }

    // Confidence decays as the residue grows: a short residue is almost
    // certainly the label, a long one is probably a sentence.
    let confidence = match target.split(' ').count() {
        1..=2 => 0.9,
        3..=4 => 0.7,
        5..=7 => 0.5,
        _ => 0.3,
    };

    Some(ExtractedTarget { target, confidence })
}
