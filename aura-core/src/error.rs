use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure categories used for retry budgeting and user-facing guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Api,
    Network,
    Validation,
    Hardware,
    Configuration,
    Processing,
    Timeout,
    Permission,
    Resource,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorCategory {
    /// How many retries this category earns before the failure is terminal.
    /// Hardware and permission failures are surfaced immediately.
    pub fn retry_budget(self) -> u32 {
        match self {
            ErrorCategory::Api | ErrorCategory::Network | ErrorCategory::Timeout => 2,
            ErrorCategory::Processing | ErrorCategory::Resource => 2,
            ErrorCategory::Validation
            | ErrorCategory::Hardware
            | ErrorCategory::Configuration
            | ErrorCategory::Permission => 0,
            ErrorCategory::Unknown => 1,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            ErrorCategory::Validation => Severity::Low,
            ErrorCategory::Api | ErrorCategory::Network | ErrorCategory::Timeout => {
                Severity::Medium
            }
            ErrorCategory::Processing | ErrorCategory::Resource | ErrorCategory::Unknown => {
                Severity::Medium
            }
            ErrorCategory::Configuration => Severity::High,
            ErrorCategory::Hardware | ErrorCategory::Permission => Severity::High,
        }
    }
}

/// A classified failure carrying everything the feedback layer needs:
/// category, severity, a short human message, and a suggested action.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AgentError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

impl AgentError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.default_severity(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Permission, message)
            .with_suggestion("grant the required permission in System Settings and retry")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }
}

/// Classify an arbitrary error message into a category by keyword. Used
/// when a collaborator surfaces an untyped failure.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("not trusted") || lower.contains("denied") {
        ErrorCategory::Permission
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCategory::Timeout
    } else if lower.contains("network")
        || lower.contains("connection")
        || lower.contains("dns")
        || lower.contains("unreachable")
    {
        ErrorCategory::Network
    } else if lower.contains("api") || lower.contains("status code") || lower.contains("quota") {
        ErrorCategory::Api
    } else if lower.contains("config") {
        ErrorCategory::Configuration
    } else if lower.contains("invalid") || lower.contains("empty") || lower.contains("malformed") {
        ErrorCategory::Validation
    } else if lower.contains("memory") || lower.contains("resource") || lower.contains("busy") {
        ErrorCategory::Resource
    } else if lower.contains("device") || lower.contains("hardware") {
        ErrorCategory::Hardware
    } else {
        ErrorCategory::Unknown
    }
}

/// Exponential backoff with jitter: base 1 s, doubling per attempt, capped
/// at 5 s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based). Jitter keeps
    /// concurrent retries from synchronizing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.max_delay);
        let jitter_ms = fastrand::u64(0..=capped.as_millis().max(1) as u64 / 4);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}
