use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

/// One timed operation, kept in the rolling buffer.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetric {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceMetric {
    pub fn new(operation: impl Into<String>, duration: Duration, success: bool) -> Self {
        Self {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
            success,
            metadata: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Duration thresholds that trigger log noise when crossed.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub warn_ms: u64,
    pub crit_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_ms: 1500,
            crit_ms: 3000,
        }
    }
}

/// Bounded rolling buffer of metrics under its own lock. Oldest entries
/// fall off once capacity is reached.
pub struct MetricsBuffer {
    inner: Mutex<VecDeque<PerformanceMetric>>,
    capacity: usize,
    thresholds: Thresholds,
}

impl MetricsBuffer {
    pub fn new(capacity: usize, thresholds: Thresholds) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            thresholds,
        }
    }

    pub fn record(&self, metric: PerformanceMetric) {
        if metric.duration_ms > self.thresholds.crit_ms {
            error!(
                operation = %metric.operation,
                duration_ms = metric.duration_ms,
                "operation exceeded critical threshold"
            );
        } else if metric.duration_ms > self.thresholds.warn_ms {
            warn!(
                operation = %metric.operation,
                duration_ms = metric.duration_ms,
                "slow operation"
            );
        }

        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(metric);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Success rate over the most recent `window` entries, or `None` when
    /// the buffer is empty.
    pub fn rolling_success_rate(&self, window: usize) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.is_empty() {
            return None;
        }
        let take = window.min(inner.len());
        let successes = inner
            .iter()
            .rev()
            .take(take)
            .filter(|m| m.success)
            .count();
        Some(successes as f64 / take as f64)
    }

    /// Failure counts per operation name, for the health surface.
    pub fn failure_counts(&self) -> Vec<(String, usize)> {
        let inner = self.inner.lock();
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for metric in inner.iter().filter(|m| !m.success) {
            *counts.entry(metric.operation.clone()).or_default() += 1;
        }
        let mut out: Vec<_> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    pub fn snapshot(&self) -> Vec<PerformanceMetric> {
        self.inner.lock().iter().cloned().collect()
    }
}

/// Raises a degradation alert when the rolling success rate drops below a
/// floor, with a cooldown so a sustained outage does not spam the log.
pub struct DegradationWatch {
    window: usize,
    min_rate: f64,
    cooldown: Duration,
    last_alert: Mutex<Option<Instant>>,
}

impl DegradationWatch {
    pub fn new(window: usize, min_rate: f64, cooldown: Duration) -> Self {
        Self {
            window,
            min_rate,
            cooldown,
            last_alert: Mutex::new(None),
        }
    }

    /// Default per §4.4.7: 100-sample window, 50 % floor, 60 s cooldown.
    pub fn with_defaults() -> Self {
        Self::new(100, 0.5, Duration::from_secs(60))
    }

    /// Returns true when an alert fired on this check.
    pub fn check(&self, buffer: &MetricsBuffer) -> bool {
        let Some(rate) = buffer.rolling_success_rate(self.window) else {
            return false;
        };
        if rate >= self.min_rate {
            return false;
        }

        let mut last = self.last_alert.lock();
        if let Some(at) = *last {
            if at.elapsed() < self.cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        warn!(
            rate = format!("{:.0}%", rate * 100.0),
            window = self.window,
            "rolling success rate degraded"
        );
        true
    }
}
