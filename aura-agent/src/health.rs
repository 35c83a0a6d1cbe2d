use std::collections::HashMap;

use serde::Serialize;

use aura_core::MetricsBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Healthy,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    /// Failure counts per operation, most frequent first.
    pub counts: Vec<(String, usize)>,
    /// Failure fraction over the recent metric window.
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: HealthLevel,
    pub score: u8,
    pub modules: HashMap<String, ModuleStatus>,
    pub errors: ErrorSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub module: String,
    pub attempted: bool,
    pub succeeded: bool,
}

/// Score the system from module statuses and the rolling metric window.
pub fn assess(modules: HashMap<String, ModuleStatus>, metrics: &MetricsBuffer) -> SystemHealth {
    let mut score: i32 = 100;
    for status in modules.values() {
        match status {
            ModuleStatus::Healthy => {}
            ModuleStatus::Degraded => score -= 15,
            ModuleStatus::Failed => score -= 30,
        }
    }

    let success_rate = metrics.rolling_success_rate(100).unwrap_or(1.0);
    let failure_rate = 1.0 - success_rate;
    score -= (failure_rate * 30.0).round() as i32;
    let score = score.clamp(0, 100) as u8;

    let overall = match score {
        85..=100 => HealthLevel::Healthy,
        60..=84 => HealthLevel::Degraded,
        30..=59 => HealthLevel::Unhealthy,
        _ => HealthLevel::Critical,
    };

    SystemHealth {
        overall,
        score,
        modules,
        errors: ErrorSummary {
            counts: metrics.failure_counts(),
            rate: failure_rate,
        },
    }
}
