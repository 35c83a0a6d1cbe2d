use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use aura_accessibility::{
    AccessibilityEngine, AppConnection, EngineError, PermissionLevel, ProviderError,
    SnapshotBuilder, TreeProvider, UiBounds, UiSnapshot,
};
use aura_core::Settings;

struct FakeProvider {
    trust: PermissionLevel,
    snapshot: Mutex<UiSnapshot>,
    snapshot_calls: AtomicUsize,
}

impl FakeProvider {
    fn new(trust: PermissionLevel, snapshot: UiSnapshot) -> Self {
        Self {
            trust,
            snapshot: Mutex::new(snapshot),
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    fn swap_snapshot(&self, snapshot: UiSnapshot) {
        *self.snapshot.lock() = snapshot;
    }

    fn captures(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

impl TreeProvider for FakeProvider {
    fn probe_trust(&self) -> PermissionLevel {
        self.trust
    }

    fn frontmost_app(&self) -> Result<String, ProviderError> {
        Ok(self.snapshot.lock().app.clone())
    }

    fn connect(&self, app: &str) -> Result<AppConnection, ProviderError> {
        Ok(AppConnection {
            app: app.to_string(),
            pid: Some(4242),
        })
    }

    fn snapshot(&self, _connection: &AppConnection) -> Result<UiSnapshot, ProviderError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.lock().clone())
    }

    fn screen_size(&self) -> (f64, f64) {
        (1920.0, 1080.0)
    }
}

fn finder_snapshot() -> UiSnapshot {
    let mut b = SnapshotBuilder::new("Finder");
    b.leaf(
        "AXMenuBarItem",
        Some("Finder"),
        None,
        None,
        UiBounds::new(100.0, 10.0, 40.0, 20.0),
    );
    b.leaf(
        "AXButton",
        Some("Trash"),
        None,
        None,
        UiBounds::new(500.0, 900.0, 60.0, 60.0),
    );
    b.build()
}

fn engine_with(provider: Arc<FakeProvider>) -> AccessibilityEngine {
    AccessibilityEngine::new(Arc::new(Settings::default()), provider)
}

#[test]
fn finds_element_in_frontmost_app() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, finder_snapshot()));
    let engine = engine_with(Arc::clone(&provider));

    let hit = engine.find_element("", "finder", None).unwrap();
    assert_eq!(hit.coordinates, (120.0, 20.0));
    assert_eq!(hit.matched_attribute, "AXTitle");
}

#[test]
fn repeated_queries_reuse_the_snapshot_cache() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, finder_snapshot()));
    let engine = engine_with(Arc::clone(&provider));

    engine.find_element("", "finder", None).unwrap();
    engine.find_element("", "trash", None).unwrap();
    assert_eq!(provider.captures(), 1);
}

#[test]
fn cache_miss_invalidates_and_refreshes_once() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, finder_snapshot()));
    let engine = engine_with(Arc::clone(&provider));

    // Warm the cache with the original tree.
    engine.find_element("", "finder", None).unwrap();
    assert_eq!(provider.captures(), 1);

    // The app re-rendered: a new element exists only in the fresh tree.
    let mut b = SnapshotBuilder::new("Finder");
    b.leaf(
        "AXButton",
        Some("Compose"),
        None,
        None,
        UiBounds::new(300.0, 300.0, 80.0, 30.0),
    );
    provider.swap_snapshot(b.build());

    let hit = engine.find_element("", "compose", None).unwrap();
    assert_eq!(hit.matched_attribute, "AXTitle");
    assert_eq!(provider.captures(), 2);
}

#[test]
fn miss_after_refresh_is_element_not_found() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, finder_snapshot()));
    let engine = engine_with(provider);

    let err = engine.find_element("", "rocket", None).unwrap_err();
    assert!(matches!(err, EngineError::ElementNotFound { .. }));
}

#[test]
fn untrusted_process_never_traverses() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::None, finder_snapshot()));
    let engine = engine_with(Arc::clone(&provider));

    let err = engine.find_element("", "finder", None).unwrap_err();
    assert!(matches!(err, EngineError::FastPathUnavailable));
    assert_eq!(provider.captures(), 0);

    let state = engine.permission_state();
    assert!(state.degraded_mode);
    assert!(!state.guidance.is_empty());
}

#[test]
fn partial_trust_reports_permission_guidance() {
    let provider = Arc::new(FakeProvider::new(
        PermissionLevel::Partial,
        finder_snapshot(),
    ));
    let engine = engine_with(Arc::clone(&provider));

    let err = engine.find_element("", "finder", None).unwrap_err();
    match err {
        EngineError::PermissionDenied { guidance } => assert!(!guidance.is_empty()),
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    assert_eq!(provider.captures(), 0);
}

#[test]
fn identical_twins_surface_as_ambiguous() {
    let mut b = SnapshotBuilder::new("App");
    // Equidistant from the 1920x1080 screen center, same role, same title.
    b.leaf("AXButton", Some("OK"), None, None, UiBounds::new(100.0, 100.0, 10.0, 10.0));
    b.leaf("AXButton", Some("OK"), None, None, UiBounds::new(1810.0, 970.0, 10.0, 10.0));
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, b.build()));
    let engine = engine_with(provider);

    let err = engine.find_element("", "OK", None).unwrap_err();
    assert!(matches!(err, EngineError::AmbiguousMatch { count: 2, .. }));
}

#[test]
fn offscreen_matches_are_rejected() {
    let mut b = SnapshotBuilder::new("App");
    b.leaf(
        "AXButton",
        Some("Ghost"),
        None,
        None,
        UiBounds::new(5000.0, 5000.0, 10.0, 10.0),
    );
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, b.build()));
    let engine = engine_with(provider);

    let err = engine.find_element("", "ghost", None).unwrap_err();
    assert!(matches!(err, EngineError::ElementNotFound { .. }));
}

#[test]
fn prefetch_warms_the_snapshot_cache() {
    let provider = Arc::new(FakeProvider::new(PermissionLevel::Full, finder_snapshot()));
    let engine = Arc::new(AccessibilityEngine::new(
        Arc::new(Settings::default()),
        Arc::clone(&provider) as Arc<dyn TreeProvider>,
    ));

    engine.prefetch_frontmost();
    for _ in 0..100 {
        if provider.captures() == 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(provider.captures(), 1);

    // The warmed snapshot serves the query without a second capture.
    engine.find_element("", "finder", None).unwrap();
    assert_eq!(provider.captures(), 1);
}

#[test]
fn permission_refresh_can_restore_the_fast_path() {
    struct FlippableProvider {
        inner: FakeProvider,
        trusted: std::sync::atomic::AtomicBool,
    }

    impl TreeProvider for FlippableProvider {
        fn probe_trust(&self) -> PermissionLevel {
            if self.trusted.load(Ordering::SeqCst) {
                PermissionLevel::Full
            } else {
                PermissionLevel::None
            }
        }
        fn frontmost_app(&self) -> Result<String, ProviderError> {
            self.inner.frontmost_app()
        }
        fn connect(&self, app: &str) -> Result<AppConnection, ProviderError> {
            self.inner.connect(app)
        }
        fn snapshot(&self, connection: &AppConnection) -> Result<UiSnapshot, ProviderError> {
            self.inner.snapshot(connection)
        }
        fn screen_size(&self) -> (f64, f64) {
            self.inner.screen_size()
        }
    }

    let provider = Arc::new(FlippableProvider {
        inner: FakeProvider::new(PermissionLevel::Full, finder_snapshot()),
        trusted: std::sync::atomic::AtomicBool::new(false),
    });
    let engine = AccessibilityEngine::new(Arc::new(Settings::default()), Arc::clone(&provider) as Arc<dyn TreeProvider>);

    assert!(matches!(
        engine.find_element("", "finder", None).unwrap_err(),
        EngineError::FastPathUnavailable
    ));

    provider.trusted.store(true, Ordering::SeqCst);
    let state = engine.refresh_permissions();
    assert!(!state.degraded_mode);
    assert!(engine.find_element("", "finder", None).is_ok());
}
