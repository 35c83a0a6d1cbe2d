use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Invoked once per accepted physical click while the listener is armed.
pub type ClickCallback = Arc<dyn Fn() + Send + Sync>;

/// Clicks closer together than this are treated as one physical click.
const CLICK_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("mouse listener thread did not start within {0:?}")]
    ThreadStart(Duration),
    #[error("mouse listener is already armed")]
    AlreadyArmed,
}

/// Global mouse listener seam. `start` arms a callback for subsequent
/// clicks; `stop` disarms it. A stopped listener delivers no callbacks,
/// even if the OS hook observes further clicks.
pub trait MouseListener: Send + Sync {
    fn start(&self, callback: ClickCallback) -> Result<(), ListenerError>;
    fn stop(&self);
    fn is_armed(&self) -> bool;
    /// Screen position of the most recent accepted click, if any.
    fn last_click(&self) -> Option<(f64, f64)>;
}

#[derive(Default)]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
struct ListenerState {
    armed: Option<ClickCallback>,
    cursor: (f64, f64),
    last_click: Option<(f64, f64)>,
    last_accepted_at: Option<Instant>,
}

/// Raw events the hook thread feeds into the shared state. Kept separate
/// from rdev's event type so the acceptance logic is testable without an
/// OS hook.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
enum RawEvent {
    Moved { x: f64, y: f64 },
    LeftButtonReleased,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn process_event(state: &Mutex<ListenerState>, event: RawEvent) {
    // Decide under the lock, invoke outside it: the callback re-enters
    // the orchestrator and must not be able to deadlock against stop().
    let callback = {
        let mut state = state.lock();
        match event {
            RawEvent::Moved { x, y } => {
                state.cursor = (x, y);
                None
            }
            RawEvent::LeftButtonReleased => {
                let now = Instant::now();
                if let Some(last) = state.last_accepted_at {
                    if now.duration_since(last) < CLICK_DEBOUNCE {
                        debug!("click burst de-duplicated");
                        return;
                    }
                }
                state.last_accepted_at = Some(now);
                let Some(callback) = state.armed.clone() else {
                    return;
                };
                state.last_click = Some(state.cursor);
                Some(callback)
            }
        }
    };

    if let Some(callback) = callback {
        callback();
    }
}

#[cfg(target_os = "macos")]
mod rdev_backend {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::{info, warn};

    const LISTENER_RETRY_DELAY: Duration = Duration::from_millis(2000);

    /// rdev-backed listener. The OS hook thread is spawned on first use
    /// and lives for the rest of the process; rdev offers no way to tear
    /// a hook down, so stop() only disarms the callback token.
    pub struct RdevListener {
        state: Arc<Mutex<ListenerState>>,
        hook_running: Arc<AtomicBool>,
        thread_started: Mutex<bool>,
        start_timeout: Duration,
    }

    impl RdevListener {
        pub fn new(start_timeout: Duration) -> Self {
            Self {
                state: Arc::new(Mutex::new(ListenerState::default())),
                hook_running: Arc::new(AtomicBool::new(false)),
                thread_started: Mutex::new(false),
                start_timeout,
            }
        }

        fn ensure_hook_thread(&self) -> Result<(), ListenerError> {
            let mut started = self.thread_started.lock();
            if *started {
                return Ok(());
            }

            let state = Arc::clone(&self.state);
            let running = Arc::clone(&self.hook_running);
            std::thread::spawn(move || {
                let mut attempt: u64 = 0;
                loop {
                    attempt += 1;
                    info!(attempt, "starting global mouse listener");
                    running.store(true, Ordering::SeqCst);

                    let loop_state = Arc::clone(&state);
                    let result = rdev::listen(move |event| match event.event_type {
                        rdev::EventType::MouseMove { x, y } => {
                            process_event(&loop_state, RawEvent::Moved { x, y });
                        }
                        rdev::EventType::ButtonRelease(rdev::Button::Left) => {
                            process_event(&loop_state, RawEvent::LeftButtonReleased);
                        }
                        _ => {}
                    });

                    running.store(false, Ordering::SeqCst);
                    match result {
                        Ok(()) => warn!("mouse listener exited unexpectedly; restarting"),
                        Err(error) => log_listen_error(&error),
                    }
                    std::thread::sleep(LISTENER_RETRY_DELAY);
                }
            });
            *started = true;

            // Wait for the hook to come up so the first armed click is
            // not lost. The hook keeps retrying on its own if this times
            // out.
            let deadline = Instant::now() + self.start_timeout;
            while !self.hook_running.load(Ordering::SeqCst) {
                if Instant::now() > deadline {
                    return Err(ListenerError::ThreadStart(self.start_timeout));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        }
    }

    fn log_listen_error(error: &rdev::ListenError) {
        match error {
            rdev::ListenError::EventTapError | rdev::ListenError::LoopSourceError => {
                warn!(
                    "mouse listener cannot access input events; grant Input Monitoring and \
                     Accessibility permissions in System Settings, retrying"
                );
            }
            other => warn!(error = ?other, "mouse listener stopped; retrying"),
        }
    }

    impl MouseListener for RdevListener {
        fn start(&self, callback: ClickCallback) -> Result<(), ListenerError> {
            self.ensure_hook_thread()?;
            let mut state = self.state.lock();
            if state.armed.is_some() {
                return Err(ListenerError::AlreadyArmed);
            }
            state.armed = Some(callback);
            state.last_click = None;
            debug!("mouse listener armed");
            Ok(())
        }

        fn stop(&self) {
            let mut state = self.state.lock();
            if state.armed.take().is_some() {
                debug!("mouse listener disarmed");
            }
        }

        fn is_armed(&self) -> bool {
            self.state.lock().armed.is_some()
        }

        fn last_click(&self) -> Option<(f64, f64)> {
            self.state.lock().last_click
        }
    }
}

#[cfg(target_os = "macos")]
pub use rdev_backend::RdevListener;
