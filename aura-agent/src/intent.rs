//! Intent recognition: an always-on regex classifier plus an
//! LLM-assisted recognizer with lock, budget, cache, and strict schema
//! parsing. Every failure path degrades to `gui_interaction` so the
//! pipeline never blocks on classification.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use aura_core::{Settings, TtlCache};

use crate::traits::{Reasoning, ResponseFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Click,
    Type,
    Scroll,
    Question,
    DetailedQuestion,
    FormFill,
    ConversationalChat,
    DeferredAction,
    GuiInteraction,
    QuestionAnswering,
    Unknown,
}

/// Output of the regex classifier. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub command_type: CommandType,
    pub normalized_command: String,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

struct Pattern {
    regex: &'static Lazy<Regex>,
    command_type: CommandType,
    confidence: f64,
}

static CLICK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(click|press|tap)\b").expect("click pattern"));
static TYPE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(type|enter|input|write)\s+["'].+["']"#).expect("quoted type pattern")
});
static TYPE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(type|enter|input)\b").expect("bare type pattern"));
static SCROLL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(scroll|page\s+up|page\s+down)\b").expect("scroll pattern"));
static DEFERRED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(write|generate|create)\s+(me\s+)?(a|an|some)?\s*\w*\s*(code|function|script|snippet|email|text|paragraph)")
        .expect("deferred pattern")
});
static DETAILED_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bin\s+detail\b").expect("detailed question pattern"));
static QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(what|where|how|why|who|when|tell\s+me|describe|explain)\b")
        .expect("question pattern")
});
static FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(fill|complete|submit)\b").expect("form pattern"));

/// Ordered, most specific first; the first hit wins.
static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        Pattern {
            regex: &TYPE_QUOTED,
            command_type: CommandType::Type,
            confidence: 0.9,
        },
        Pattern {
            regex: &DEFERRED,
            command_type: CommandType::DeferredAction,
            confidence: 0.9,
        },
        Pattern {
            regex: &CLICK,
            command_type: CommandType::Click,
            confidence: 0.9,
        },
        Pattern {
            regex: &SCROLL,
            command_type: CommandType::Scroll,
            confidence: 0.9,
        },
        Pattern {
            regex: &TYPE_BARE,
            command_type: CommandType::Type,
            confidence: 0.6,
        },
        Pattern {
            regex: &FORM,
            command_type: CommandType::FormFill,
            confidence: 0.6,
        },
        Pattern {
            regex: &QUESTION,
            command_type: CommandType::Question,
            confidence: 0.6,
        },
    ]
});

/// Normalize whitespace and case for classification and caching.
pub fn normalize_command(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Regex classification over the normalized command.
pub fn classify(normalized: &str) -> ValidationResult {
    if normalized.is_empty() {
        return ValidationResult {
            is_valid: false,
            command_type: CommandType::Unknown,
            normalized_command: String::new(),
            confidence: 0.0,
            issues: vec!["empty_command".to_string()],
            suggestions: vec!["say what you want me to do".to_string()],
        };
    }

    for pattern in PATTERNS.iter() {
        if pattern.regex.is_match(normalized) {
            let mut command_type = pattern.command_type;
            let mut confidence = pattern.confidence;
            if command_type == CommandType::Question && DETAILED_QUESTION.is_match(normalized) {
                command_type = CommandType::DetailedQuestion;
                confidence = 0.9;
            }
            return ValidationResult {
                is_valid: true,
                command_type,
                normalized_command: normalized.to_string(),
                confidence,
                issues: Vec::new(),
                suggestions: Vec::new(),
            };
        }
    }

    ValidationResult {
        is_valid: true,
        command_type: CommandType::Unknown,
        normalized_command: normalized.to_string(),
        confidence: 0.3,
        issues: Vec::new(),
        suggestions: Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    GuiInteraction,
    ConversationalChat,
    DeferredAction,
    QuestionAnswering,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentParameters {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_request: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent: IntentKind,
    pub confidence: f64,
    #[serde(default)]
    pub parameters: IntentParameters,
    #[serde(default)]
    pub reasoning: String,
}

impl Intent {
    /// The safe default used whenever recognition cannot run.
    pub fn fallback() -> Self {
        Self {
            intent: IntentKind::GuiInteraction,
            confidence: 0.0,
            parameters: IntentParameters::default(),
            reasoning: "fallback".to_string(),
        }
    }
}

const INTENT_PROMPT: &str = "Classify the user command into exactly one intent: \
gui_interaction, conversational_chat, deferred_action, or question_answering. \
Respond with JSON only: {\"intent\": ..., \"confidence\": 0.0-1.0, \
\"parameters\": {\"content_type\": null, \"content_request\": null, \
\"question\": null}, \"reasoning\": \"...\"}.\n\nCommand: ";

/// LLM-assisted recognizer. Serializes model calls behind its own lock,
/// enforces the overall budget, and caches results by normalized command.
pub struct IntentRecognizer {
    reasoning: Arc<dyn Reasoning>,
    settings: Arc<Settings>,
    lock: Mutex<()>,
    cache: TtlCache<String, Intent>,
    cache_enabled: bool,
}

impl IntentRecognizer {
    pub fn new(reasoning: Arc<dyn Reasoning>, settings: Arc<Settings>) -> Self {
        let cache = TtlCache::new(256, Duration::from_secs(300));
        Self {
            reasoning,
            settings,
            lock: Mutex::new(()),
            cache,
            cache_enabled: true,
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Recognize the intent of a normalized command. Never fails: lock
    /// timeouts, budget overruns, and schema violations all degrade to
    /// the gui_interaction fallback at zero confidence.
    pub async fn recognize(&self, normalized: &str) -> Intent {
        if self.cache_enabled {
            if let Some(hit) = self.cache.get(&normalized.to_string()) {
                debug!(command = %normalized, "intent cache hit");
                return hit;
            }
        }

        let guard = match tokio::time::timeout(self.settings.locks.intent(), self.lock.lock()).await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!("intent lock timed out; using gui_interaction fallback");
                return Intent::fallback();
            }
        };

        let intent = match tokio::time::timeout(
            self.settings.intent_recognition_timeout(),
            self.ask_model(normalized),
        )
        .await
        {
            Ok(Some(intent)) => intent,
            Ok(None) => Intent::fallback(),
            Err(_) => {
                warn!("intent recognition exceeded its budget");
                Intent::fallback()
            }
        };
        drop(guard);

        if self.cache_enabled && intent.confidence > 0.0 {
            self.cache.insert(normalized.to_string(), intent.clone());
        }
        intent
    }

    async fn ask_model(&self, normalized: &str) -> Option<Intent> {
        let prompt = format!("{INTENT_PROMPT}{normalized}");
        let response = match self
            .reasoning
            .generate(&prompt, 500, ResponseFormat::Json)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "intent model call failed");
                return None;
            }
        };

        match parse_intent(&response) {
            Some(intent) => Some(intent),
            None => {
                warn!(response_len = response.len(), "intent response violated the schema");
                None
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Strict schema parse; any violation is a `None` and the caller falls
/// back.
fn parse_intent(response: &str) -> Option<Intent> {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    let intent: Intent = serde_json::from_str(body).ok()?;
    if !(0.0..=1.0).contains(&intent.confidence) {
        return None;
    }
    Some(intent)
}

/// Routing rule: trust the model above the configured threshold,
/// otherwise fall back to the regex classification, otherwise GUI.
pub fn route_intent(
    intent: &Intent,
    validation: &ValidationResult,
    settings: &Settings,
) -> IntentKind {
    if intent.confidence >= settings.intent_confidence_threshold {
        return intent.intent;
    }
    match validation.command_type {
        CommandType::ConversationalChat => IntentKind::ConversationalChat,
        CommandType::DeferredAction => IntentKind::DeferredAction,
        CommandType::Question
        | CommandType::DetailedQuestion
        | CommandType::QuestionAnswering => IntentKind::QuestionAnswering,
        CommandType::Click
        | CommandType::Type
        | CommandType::Scroll
        | CommandType::FormFill
        | CommandType::GuiInteraction => IntentKind::GuiInteraction,
        CommandType::Unknown => IntentKind::GuiInteraction,
    }
}
