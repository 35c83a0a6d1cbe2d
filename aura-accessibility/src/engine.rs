use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use aura_core::{
    DegradationWatch, FuzzyMatcher, MetricsBuffer, PerformanceMetric, Settings, Thresholds,
    TtlCache,
};

use crate::permissions::{PermissionLevel, PermissionState};
use crate::provider::{AppConnection, ProviderError, TreeProvider};
use crate::search::{find_in_snapshot, ElementMatch, SearchMiss};
use crate::snapshot::UiSnapshot;
use crate::target::{ExtractedTarget, TargetExtractor};

/// Typed reasons the fast path can refuse a query. The planner maps these
/// onto its fallback decision.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("accessibility engine not initialized")]
    NotInitialized,
    #[error("accessibility permission missing")]
    PermissionDenied { guidance: Vec<String> },
    #[error("fast path unavailable in degraded mode")]
    FastPathUnavailable,
    #[error("no element matching '{label}' in {app}")]
    ElementNotFound { label: String, app: String },
    #[error("{count} elements tie for '{label}'")]
    AmbiguousMatch { label: String, count: usize },
    #[error("accessibility operation timed out")]
    Timeout,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The accessibility fast-path engine: owns the tree provider, the
/// per-app connection and snapshot caches, the fuzzy matcher, and the
/// target extractor. One instance serves the whole orchestrator.
pub struct AccessibilityEngine {
    settings: Arc<Settings>,
    provider: Arc<dyn TreeProvider>,
    matcher: FuzzyMatcher,
    extractor: TargetExtractor,
    connections: TtlCache<String, AppConnection>,
    snapshots: TtlCache<String, Arc<UiSnapshot>>,
    permission: RwLock<PermissionState>,
    metrics: MetricsBuffer,
    degradation: DegradationWatch,
}

impl AccessibilityEngine {
    pub fn new(settings: Arc<Settings>, provider: Arc<dyn TreeProvider>) -> Self {
        let caches = &settings.caches;
        let matcher = FuzzyMatcher::new(
            settings.fuzzy.clone(),
            caches.fuzzy_max,
            std::time::Duration::from_secs(caches.fuzzy_ttl_s),
        );
        let extractor = TargetExtractor::new(
            caches.target_max,
            std::time::Duration::from_secs(caches.target_ttl_s),
        );
        let connections = TtlCache::new(
            caches.connection_max,
            std::time::Duration::from_secs(caches.connection_ttl_s),
        );
        let snapshots = TtlCache::new(
            caches.snapshot_max,
            std::time::Duration::from_secs(caches.snapshot_ttl_s),
        );
        let thresholds = Thresholds {
            warn_ms: settings.perf_warn_ms,
            crit_ms: settings.perf_crit_ms,
        };
        let metrics = MetricsBuffer::new(settings.metrics_capacity, thresholds);
        let permission = RwLock::new(PermissionState::from_level(provider.probe_trust()));

        let state = permission.read().clone();
        if state.degraded_mode {
            warn!(level = ?state.level, "accessibility starting in degraded mode");
            for step in &state.guidance {
                info!(step = %step, "accessibility permission guidance");
            }
        }

        Self {
            settings,
            provider,
            matcher,
            extractor,
            connections,
            snapshots,
            permission,
            metrics,
            degradation: DegradationWatch::with_defaults(),
        }
    }

    /// Re-run the platform trust probe and update degraded mode.
    pub fn refresh_permissions(&self) -> PermissionState {
        let state = PermissionState::from_level(self.provider.probe_trust());
        *self.permission.write() = state.clone();
        state
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission.read().clone()
    }

    pub fn is_available(&self) -> bool {
        !self.permission.read().degraded_mode && self.settings.fast_path_enabled
    }

    /// Derive the search label from a raw command.
    pub fn extract_target(&self, command: &str) -> Option<ExtractedTarget> {
        self.extractor.extract(command)
    }

    /// Find the best clickable element for `label`. `role` empty means
    /// any clickable role; `app` defaults to the frontmost application.
    ///
    /// A miss against a cached snapshot invalidates that entry and
    /// retries once against a fresh capture before giving up.
    pub fn find_element(
        &self,
        role: &str,
        label: &str,
        app: Option<&str>,
    ) -> Result<ElementMatch, EngineError> {
        let started = Instant::now();
        let result = self.find_element_inner(role, label, app);

        let (success, app_name, attribute, score) = match &result {
            Ok(hit) => (true, None, Some(hit.matched_attribute.clone()), Some(hit.score)),
            Err(_) => (false, app.map(str::to_string), None, None),
        };
        self.metrics.record(
            PerformanceMetric::new("find_element", started.elapsed(), success).with_metadata(
                json!({
                    "app": app_name,
                    "role_searched": role,
                    "attribute_matched": attribute,
                    "score": score,
                }),
            ),
        );
        self.degradation.check(&self.metrics);

        result
    }

    fn find_element_inner(
        &self,
        role: &str,
        label: &str,
        app: Option<&str>,
    ) -> Result<ElementMatch, EngineError> {
        {
            let state = self.permission.read();
            if state.degraded_mode {
                if state.level == PermissionLevel::None {
                    return Err(EngineError::FastPathUnavailable);
                }
                return Err(EngineError::PermissionDenied {
                    guidance: state.guidance.clone(),
                });
            }
        }
        if label.trim().is_empty() {
            return Err(EngineError::ElementNotFound {
                label: label.to_string(),
                app: app.unwrap_or("<frontmost>").to_string(),
            });
        }

        let app_name = match app {
            Some(name) => name.to_string(),
            None => self.provider.frontmost_app()?,
        };
        let connection = self.connection(&app_name)?;

        let (snapshot, from_cache) = self.snapshot(&connection)?;
        let screen_center = self.screen_center();

        match find_in_snapshot(
            &snapshot,
            role,
            label,
            &self.settings,
            &self.matcher,
            screen_center,
        ) {
            Ok(hit) => Ok(self.validated(hit, label)?),
            Err(miss) if from_cache => {
                // Authoritative miss after a positive cache hit: the tree
                // may have changed. Refresh once.
                debug!(app = %app_name, ?miss, "cache snapshot missed; refreshing");
                self.snapshots.invalidate(&app_name);
                let fresh = self.capture(&connection)?;
                match find_in_snapshot(
                    &fresh,
                    role,
                    label,
                    &self.settings,
                    &self.matcher,
                    screen_center,
                ) {
                    Ok(hit) => Ok(self.validated(hit, label)?),
                    Err(_) => Err(EngineError::ElementNotFound {
                        label: label.to_string(),
                        app: app_name,
                    }),
                }
            }
            Err(_) => Err(EngineError::ElementNotFound {
                label: label.to_string(),
                app: app_name,
            }),
        }
    }

    /// Reject matches whose geometry fell outside the screen, and surface
    /// genuine full-key ties so the planner can fall back to vision.
    fn validated(&self, hit: ElementMatch, label: &str) -> Result<ElementMatch, EngineError> {
        if hit.full_key_ties > 0 {
            return Err(EngineError::AmbiguousMatch {
                label: label.to_string(),
                count: hit.full_key_ties + 1,
            });
        }
        let (w, h) = self.provider.screen_size();
        let (x, y) = hit.coordinates;
        if !(x.is_finite() && y.is_finite()) || x < 0.0 || y < 0.0 || x > w || y > h {
            return Err(EngineError::ElementNotFound {
                label: label.to_string(),
                app: String::new(),
            });
        }
        Ok(hit)
    }

    fn connection(&self, app: &str) -> Result<AppConnection, EngineError> {
        if let Some(conn) = self.connections.get(&app.to_string()) {
            return Ok(conn);
        }
        let conn = self.provider.connect(app)?;
        self.connections.insert(app.to_string(), conn.clone());
        Ok(conn)
    }

    fn snapshot(&self, connection: &AppConnection) -> Result<(Arc<UiSnapshot>, bool), EngineError> {
        if let Some(snapshot) = self.snapshots.get(&connection.app) {
            return Ok((snapshot, true));
        }
        Ok((self.capture(connection)?, false))
    }

    fn capture(&self, connection: &AppConnection) -> Result<Arc<UiSnapshot>, EngineError> {
        let snapshot = Arc::new(self.provider.snapshot(connection)?);
        self.snapshots
            .insert(connection.app.clone(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn screen_center(&self) -> (f64, f64) {
        let (w, h) = self.provider.screen_size();
        (w / 2.0, h / 2.0)
    }

    /// Speculatively refresh the frontmost app's snapshot so the next
    /// query hits warm data. Runs on its own thread; failures only log.
    pub fn prefetch_frontmost(self: &Arc<Self>) {
        if !self.is_available() {
            return;
        }
        let engine = Arc::clone(self);
        std::thread::spawn(move || {
            let result = engine
                .provider
                .frontmost_app()
                .and_then(|app| engine.provider.connect(&app))
                .and_then(|conn| {
                    engine.provider.snapshot(&conn).map(|snapshot| {
                        engine
                            .snapshots
                            .insert(conn.app.clone(), Arc::new(snapshot));
                    })
                });
            if let Err(e) = result {
                debug!(error = %e, "snapshot prefetch failed");
            }
        });
    }

    pub fn clear_caches(&self) {
        self.connections.clear();
        self.snapshots.clear();
        self.matcher.clear_cache();
        self.extractor.clear_cache();
    }

    /// Rolling success rate over the last 100 operations, for health.
    pub fn success_rate(&self) -> Option<f64> {
        self.metrics.rolling_success_rate(100)
    }

    pub fn metrics(&self) -> &MetricsBuffer {
        &self.metrics
    }
}
