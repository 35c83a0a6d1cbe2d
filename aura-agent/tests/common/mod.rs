//! Shared fakes for orchestrator integration tests. Each fake records
//! what it was asked to do so scenarios can assert on collaborator
//! traffic.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use aura_accessibility::{
    AccessibilityEngine, AppConnection, PermissionLevel, ProviderError, SnapshotBuilder,
    TreeProvider, UiBounds, UiSnapshot,
};
use aura_agent::{
    ActionPlan, Audio, Feedback, ImageHandle, Reasoning, ResponseFormat, ScreenContext, SoundCue,
    SpeakPriority, Vision,
};
use aura_core::Settings;
use aura_input::{
    Automation, AutomationError, ClickCallback, ListenerError, MouseListener, ScrollDirection,
    TypingBudget,
};

// ---------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------

pub struct FakeReasoning {
    /// `(substring, response)` pairs matched against generation prompts,
    /// first hit wins.
    responses: Mutex<Vec<(String, String)>>,
    plan: Mutex<ActionPlan>,
    fail_generation: AtomicBool,
    pub generate_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
}

impl FakeReasoning {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(Vec::new()),
            plan: Mutex::new(ActionPlan::default()),
            fail_generation: AtomicBool::new(false),
            generate_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
        })
    }

    pub fn respond_when(&self, needle: &str, response: &str) {
        self.responses
            .lock()
            .push((needle.to_string(), response.to_string()));
    }

    pub fn set_plan(&self, plan: ActionPlan) {
        *self.plan.lock() = plan;
    }

    pub fn fail_generation(&self) {
        self.fail_generation.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Reasoning for FakeReasoning {
    async fn get_action_plan(
        &self,
        _command: &str,
        _screen_context: &ScreenContext,
    ) -> anyhow::Result<ActionPlan> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.plan.lock().clone())
    }

    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _response_format: ResponseFormat,
    ) -> anyhow::Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation.load(Ordering::SeqCst) && prompt.starts_with("Generate") {
            anyhow::bail!("model unavailable");
        }
        let responses = self.responses.lock();
        for (needle, response) in responses.iter() {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        // Default: an intent answer the router will not trust.
        Ok(r#"{"intent": "gui_interaction", "confidence": 0.1}"#.to_string())
    }
}

// ---------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------

pub struct FakeVision {
    pub capture_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
    pub last_prompt: Mutex<String>,
}

impl FakeVision {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            capture_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl Vision for FakeVision {
    async fn capture_screen(&self) -> anyhow::Result<ImageHandle> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageHandle(Vec::new()))
    }

    async fn analyze(&self, _image: &ImageHandle, prompt: &str) -> anyhow::Result<ScreenContext> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = prompt.to_string();
        Ok(ScreenContext::default())
    }
}

// ---------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedAction {
    Click(f64, f64),
    DoubleClick(f64, f64),
    Type(String),
    Scroll(ScrollDirection, i32),
}

pub struct FakeAutomation {
    pub actions: Mutex<Vec<RecordedAction>>,
}

impl FakeAutomation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            actions: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<RecordedAction> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn click(&self, x: f64, y: f64) -> Result<(), AutomationError> {
        self.actions.lock().push(RecordedAction::Click(x, y));
        Ok(())
    }

    async fn double_click(&self, x: f64, y: f64) -> Result<(), AutomationError> {
        self.actions.lock().push(RecordedAction::DoubleClick(x, y));
        Ok(())
    }

    async fn type_text(&self, text: &str, _budget: TypingBudget) -> Result<(), AutomationError> {
        self.actions
            .lock()
            .push(RecordedAction::Type(text.to_string()));
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> Result<(), AutomationError> {
        self.actions
            .lock()
            .push(RecordedAction::Scroll(direction, amount));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Feedback / Audio
// ---------------------------------------------------------------------

pub struct FakeFeedback {
    pub cues: Mutex<Vec<SoundCue>>,
    pub spoken: Mutex<Vec<String>>,
}

impl FakeFeedback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cues: Mutex::new(Vec::new()),
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn played(&self, cue: SoundCue) -> bool {
        self.cues.lock().contains(&cue)
    }

    pub fn spoke_containing(&self, needle: &str) -> bool {
        self.spoken.lock().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl Feedback for FakeFeedback {
    async fn play(&self, cue: SoundCue) {
        self.cues.lock().push(cue);
    }

    async fn speak(&self, message: &str, _priority: SpeakPriority) {
        self.spoken.lock().push(message.to_string());
    }
}

pub struct FakeAudio;

#[async_trait]
impl Audio for FakeAudio {
    async fn recognize(&self) -> anyhow::Result<String> {
        anyhow::bail!("no microphone in tests")
    }

    async fn speak(&self, _text: &str, _priority: SpeakPriority) {}
}

// ---------------------------------------------------------------------
// Mouse listener
// ---------------------------------------------------------------------

#[derive(Default)]
struct FakeListenerState {
    armed: Option<ClickCallback>,
    last_click: Option<(f64, f64)>,
}

pub struct FakeListener {
    state: Mutex<FakeListenerState>,
}

impl FakeListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeListenerState::default()),
        })
    }

    /// Simulate a physical click at `(x, y)`.
    pub fn click_at(&self, x: f64, y: f64) {
        let callback = {
            let mut state = self.state.lock();
            if state.armed.is_some() {
                state.last_click = Some((x, y));
            }
            state.armed.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl MouseListener for FakeListener {
    fn start(&self, callback: ClickCallback) -> Result<(), ListenerError> {
        let mut state = self.state.lock();
        if state.armed.is_some() {
            return Err(ListenerError::AlreadyArmed);
        }
        state.armed = Some(callback);
        state.last_click = None;
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().armed = None;
    }

    fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    fn last_click(&self) -> Option<(f64, f64)> {
        self.state.lock().last_click
    }
}

// ---------------------------------------------------------------------
// Accessibility provider
// ---------------------------------------------------------------------

pub struct FakeProvider {
    trust: PermissionLevel,
    snapshot: Mutex<UiSnapshot>,
    pub snapshot_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(trust: PermissionLevel, snapshot: UiSnapshot) -> Arc<Self> {
        Arc::new(Self {
            trust,
            snapshot: Mutex::new(snapshot),
            snapshot_calls: AtomicUsize::new(0),
        })
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
            pid: Some(7),
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

/// A Finder-like frontmost app with a menu bar item and one button.
pub fn finder_snapshot() -> UiSnapshot {
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

pub fn engine_for(provider: Arc<FakeProvider>) -> Arc<AccessibilityEngine> {
    Arc::new(AccessibilityEngine::new(
        Arc::new(Settings::default()),
        provider,
    ))
}

/// Poll until `condition` holds or the budget runs out.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
