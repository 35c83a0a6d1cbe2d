use std::time::Duration;

use serde::Deserialize;

use crate::fuzzy::FuzzyConfig;

/// Accessibility roles the fast path treats as activatable. An empty role
/// constraint in a query means "any member of this set".
pub const DEFAULT_CLICKABLE_ROLES: [&str; 11] = [
    "AXButton",
    "AXMenuButton",
    "AXMenuItem",
    "AXMenuBarItem",
    "AXLink",
    "AXCheckBox",
    "AXRadioButton",
    "AXTab",
    "AXToolbarButton",
    "AXPopUpButton",
    "AXComboBox",
];

/// Attribute search order. The first present, non-empty attribute that
/// meets the fuzzy threshold wins.
pub const DEFAULT_ATTRIBUTE_PRIORITY: [&str; 3] = ["AXTitle", "AXDescription", "AXValue"];

/// Lock acquisition timeouts, in seconds. Every acquire is bounded; on
/// timeout the caller proceeds with its documented safe fallback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockTimeouts {
    pub execution_s: u64,
    pub deferred_s: u64,
    pub intent_s: u64,
}

impl Default for LockTimeouts {
    fn default() -> Self {
        Self {
            execution_s: 30,
            deferred_s: 5,
            intent_s: 10,
        }
    }
}

impl LockTimeouts {
    pub fn execution(&self) -> Duration {
        Duration::from_secs(self.execution_s)
    }

    pub fn deferred(&self) -> Duration {
        Duration::from_secs(self.deferred_s)
    }

    pub fn intent(&self) -> Duration {
        Duration::from_secs(self.intent_s)
    }
}

/// Size and TTL bounds for the four caches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub fuzzy_ttl_s: u64,
    pub fuzzy_max: usize,
    pub target_ttl_s: u64,
    pub target_max: usize,
    pub connection_ttl_s: u64,
    pub connection_max: usize,
    pub snapshot_ttl_s: u64,
    pub snapshot_max: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            fuzzy_ttl_s: 60,
            fuzzy_max: 4096,
            target_ttl_s: 300,
            target_max: 256,
            connection_ttl_s: 300,
            connection_max: 10,
            snapshot_ttl_s: 30,
            snapshot_max: 1000,
        }
    }
}

/// The full configuration surface. Loading from a file or the environment
/// is the embedder's job; everything here has a working default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fast_path_enabled: bool,
    /// Speculatively refresh the focused app's snapshot when a command
    /// begins, so the fast path hits warm data.
    pub snapshot_prefetch: bool,
    pub fuzzy: FuzzyConfig,
    pub clickable_roles: Vec<String>,
    pub attribute_priority: Vec<String>,
    pub deferred_action_timeout_s: u64,
    pub mouse_listener_thread_timeout_s: u64,
    pub intent_recognition_timeout_s: u64,
    pub intent_confidence_threshold: f64,
    pub locks: LockTimeouts,
    pub caches: CacheSettings,
    pub perf_warn_ms: u64,
    pub perf_crit_ms: u64,
    pub conversation_context_size: usize,
    pub metrics_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fast_path_enabled: true,
            snapshot_prefetch: false,
            fuzzy: FuzzyConfig::default(),
            clickable_roles: DEFAULT_CLICKABLE_ROLES
                .iter()
                .map(|r| r.to_string())
                .collect(),
            attribute_priority: DEFAULT_ATTRIBUTE_PRIORITY
                .iter()
                .map(|a| a.to_string())
                .collect(),
            deferred_action_timeout_s: 300,
            mouse_listener_thread_timeout_s: 10,
            intent_recognition_timeout_s: 15,
            intent_confidence_threshold: 0.7,
            locks: LockTimeouts::default(),
            caches: CacheSettings::default(),
            perf_warn_ms: 1500,
            perf_crit_ms: 3000,
            conversation_context_size: 5,
            metrics_capacity: 1000,
        }
    }
}

impl Settings {
    pub fn deferred_action_timeout(&self) -> Duration {
        Duration::from_secs(self.deferred_action_timeout_s)
    }

    pub fn intent_recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.intent_recognition_timeout_s)
    }

    /// True when `role` counts as clickable under the configured role set.
    pub fn is_clickable_role(&self, role: &str) -> bool {
        self.clickable_roles.iter().any(|r| r == role)
    }

    /// Position of `role` in the configured set, for ranking ties. Roles
    /// outside the set sort last.
    pub fn role_rank(&self, role: &str) -> usize {
        self.clickable_roles
            .iter()
            .position(|r| r == role)
            .unwrap_or(self.clickable_roles.len())
    }

    /// Position of `attribute` in the configured priority order.
    pub fn attribute_rank(&self, attribute: &str) -> usize {
        self.attribute_priority
            .iter()
            .position(|a| a == attribute)
            .unwrap_or(self.attribute_priority.len())
    }
}
