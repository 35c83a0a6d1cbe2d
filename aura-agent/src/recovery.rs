//! Cross-cutting failure handling: category-budgeted retries and the
//! bounded module-reinitialization registry.

use std::fmt::Display;
use std::future::Future;

use dashmap::DashMap;
use tracing::{error, warn};
use uuid::Uuid;

use aura_core::{classify_message, AgentError, ErrorCategory, RetryPolicy};

/// Run `op`, retrying per the category's budget with backoff and jitter.
/// Categories with a zero budget (hardware, permission, validation) run
/// exactly once.
pub async fn with_retries<T, E, F, Fut>(category: ErrorCategory, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let budget = category.retry_budget();
    let policy = RetryPolicy::default();
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < budget => {
                let delay = policy.delay_for(attempt);
                warn!(
                    ?category,
                    attempt = attempt + 1,
                    budget,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classify a terminal failure and emit the structured record every
/// terminal failure produces. Returns the classified error so the caller
/// can speak its message and suggestion.
pub fn report_terminal_failure(execution_id: Uuid, message: &str) -> AgentError {
    let category = classify_message(message);
    let err = AgentError::new(category, message).with_suggestion(suggestion_for(category));
    error!(
        execution_id = %execution_id,
        category = ?err.category,
        severity = ?err.severity,
        message = %err.message,
        suggestion = err.suggestion.as_deref().unwrap_or(""),
        "command failed"
    );
    err
}

fn suggestion_for(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Permission => "grant the required permission in System Settings",
        ErrorCategory::Network | ErrorCategory::Api => "check the network connection and retry",
        ErrorCategory::Timeout => "retry; the system may be under load",
        ErrorCategory::Validation => "rephrase the command",
        ErrorCategory::Hardware => "check the input device",
        ErrorCategory::Configuration => "review the agent configuration",
        ErrorCategory::Processing | ErrorCategory::Resource | ErrorCategory::Unknown => {
            "retry the command"
        }
    }
}

/// Module reinitializations are bounded per process lifetime so a
/// permanently broken module cannot hold the agent in a restart loop.
pub struct RecoveryRegistry {
    attempts: DashMap<String, u32>,
    max_per_module: u32,
}

impl RecoveryRegistry {
    pub fn new(max_per_module: u32) -> Self {
        Self {
            attempts: DashMap::new(),
            max_per_module,
        }
    }

    /// Claim one reinitialization slot for `module`. False once the
    /// module has exhausted its budget.
    pub fn try_begin(&self, module: &str) -> bool {
        let mut entry = self.attempts.entry(module.to_string()).or_insert(0);
        if *entry >= self.max_per_module {
            warn!(module, attempts = *entry, "module recovery budget exhausted");
            return false;
        }
        *entry += 1;
        true
    }

    pub fn attempts_for(&self, module: &str) -> u32 {
        self.attempts.get(module).map(|v| *v).unwrap_or(0)
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_stop_at_the_category_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retries(ErrorCategory::Network, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("connection refused".to_string()) }
        })
        .await;
        assert!(result.is_err());
        // Budget 2 means one initial try plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_budget_categories_run_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retries(ErrorCategory::Permission, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("permission denied".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_short_circuits() {
        let result: Result<u32, String> =
            with_retries(ErrorCategory::Api, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn registry_bounds_reinitialization() {
        let registry = RecoveryRegistry::new(3);
        assert!(registry.try_begin("accessibility"));
        assert!(registry.try_begin("accessibility"));
        assert!(registry.try_begin("accessibility"));
        assert!(!registry.try_begin("accessibility"));
        assert!(registry.try_begin("intent"));
        assert_eq!(registry.attempts_for("accessibility"), 3);
    }

    #[test]
    fn terminal_failures_are_classified() {
        let err = report_terminal_failure(Uuid::new_v4(), "operation timed out");
        assert_eq!(err.category, ErrorCategory::Timeout);
        assert!(err.suggestion.is_some());
    }
}
