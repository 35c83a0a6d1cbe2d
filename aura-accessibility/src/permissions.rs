use serde::{Deserialize, Serialize};

/// Result of the platform trust probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Process is trusted; the fast path is available.
    Full,
    /// Some reads succeed but the tree is incomplete (e.g. trust granted
    /// mid-session and not yet picked up by every app).
    Partial,
    /// Probe failed; every fast-path call short-circuits.
    None,
}

/// Permission state the engine reports to the orchestrator's health
/// surface.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionState {
    pub level: PermissionLevel,
    pub degraded_mode: bool,
    pub guidance: Vec<String>,
}

impl PermissionState {
    pub fn from_level(level: PermissionLevel) -> Self {
        let degraded_mode = level != PermissionLevel::Full;
        let guidance = if degraded_mode {
            guidance_steps()
        } else {
            Vec::new()
        };
        Self {
            level,
            degraded_mode,
            guidance,
        }
    }
}

/// Steps for granting accessibility access, spoken and logged when the
/// probe comes back degraded.
pub fn guidance_steps() -> Vec<String> {
    vec![
        "Open System Settings and go to Privacy & Security > Accessibility".to_string(),
        "Enable the toggle next to this application".to_string(),
        "Restart the application so the trust grant takes effect".to_string(),
    ]
}
