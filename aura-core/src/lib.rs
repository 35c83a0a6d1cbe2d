//! Shared foundation for the aura workspace: the settings surface, the
//! error taxonomy and retry policy, fuzzy string scoring, bounded TTL
//! caches, and the performance metric buffer.

mod cache;
mod error;
mod fuzzy;
mod metrics;
mod settings;

pub use cache::{CacheStats, TtlCache};
pub use error::{classify_message, AgentError, ErrorCategory, RetryPolicy, Severity};
pub use fuzzy::{FuzzyConfig, FuzzyMatcher};
pub use metrics::{DegradationWatch, MetricsBuffer, PerformanceMetric, Thresholds};
pub use settings::{
    CacheSettings, LockTimeouts, Settings, DEFAULT_ATTRIBUTE_PRIORITY, DEFAULT_CLICKABLE_ROLES,
};
