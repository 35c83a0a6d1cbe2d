use thiserror::Error;

use crate::permissions::PermissionLevel;
use crate::snapshot::UiSnapshot;

/// A resolved application the provider can snapshot. Cached by the engine
/// so repeated queries against the same app skip process lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConnection {
    pub app: String,
    pub pid: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("accessibility API is not trusted for this process")]
    NotTrusted,
    #[error("no frontmost application")]
    NoFrontmostApp,
    #[error("application not found: {0}")]
    AppNotFound(String),
    #[error("attribute read exceeded {0} ms")]
    AttributeTimeout(u64),
    #[error("tree build failed: {0}")]
    TreeBuild(String),
}

/// Capability seam over the native accessibility stack. The macOS
/// implementation drives the AX API; tests supply canned snapshots.
pub trait TreeProvider: Send + Sync {
    /// Probe whether this process may read other applications' trees.
    fn probe_trust(&self) -> PermissionLevel;

    /// Name of the currently focused application.
    fn frontmost_app(&self) -> Result<String, ProviderError>;

    /// Resolve an application name to a connection.
    fn connect(&self, app: &str) -> Result<AppConnection, ProviderError>;

    /// Capture a fresh tree snapshot for a connected application. This is
    /// the expensive call the snapshot cache exists to amortize.
    fn snapshot(&self, connection: &AppConnection) -> Result<UiSnapshot, ProviderError>;

    /// Current main-display size, for coordinate validation and the
    /// distance-to-center ranking key.
    fn screen_size(&self) -> (f64, f64);
}
