use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("input backend unavailable: {0}")]
    Backend(String),
    #[error("typing exceeded its {budget_ms} ms budget after {typed_lines} lines")]
    TypingTimeout { budget_ms: u64, typed_lines: usize },
    #[error("coordinates out of range: ({x}, {y})")]
    BadCoordinates { x: f64, y: f64 },
    #[error("worker thread failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Overall wall-clock budget for one `type_text` call. The transport
/// checks elapsed time between lines rather than relying on signals,
/// since typing runs on a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingBudget {
    /// 15 s, for fast-path dispatch.
    Fast,
    /// 30 s, for fallback and deferred placement.
    Slow,
}

impl TypingBudget {
    pub fn duration(self) -> Duration {
        match self {
            TypingBudget::Fast => Duration::from_secs(15),
            TypingBudget::Slow => Duration::from_secs(30),
        }
    }
}

/// Capability seam over the input device. Tests inject a recording fake;
/// production uses [`EnigoAutomation`].
#[async_trait]
pub trait Automation: Send + Sync {
    async fn click(&self, x: f64, y: f64) -> Result<(), AutomationError>;
    async fn double_click(&self, x: f64, y: f64) -> Result<(), AutomationError>;
    /// Type `text` verbatim. Newlines become Return keystrokes so
    /// multi-line content keeps its shape in the target editor.
    async fn type_text(&self, text: &str, budget: TypingBudget) -> Result<(), AutomationError>;
    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> Result<(), AutomationError>;
}

/// Where typed lines land: the enigo keyboard in production, a recording
/// buffer in tests.
pub trait LineSink {
    fn write_line(&mut self, line: &str) -> Result<(), AutomationError>;
    fn press_return(&mut self) -> Result<(), AutomationError>;
}

/// Per-line transport: type each line verbatim, press Return between
/// lines, and enforce the overall budget against wall-clock time.
pub fn drive_typing<S: LineSink>(
    sink: &mut S,
    text: &str,
    budget: Duration,
) -> Result<(), AutomationError> {
    let started = Instant::now();
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    for (index, line) in lines.iter().enumerate() {
        if started.elapsed() > budget {
            warn!(
                typed_lines = index,
                total_lines = total,
                "typing aborted by budget"
            );
            return Err(AutomationError::TypingTimeout {
                budget_ms: budget.as_millis() as u64,
                typed_lines: index,
            });
        }

        if !line.is_empty() {
            sink.write_line(line)?;
        }
        if index + 1 < total {
            sink.press_return()?;
        }
    }

    debug!(
        lines = total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "typed content"
    );
    Ok(())
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn check_coordinates(x: f64, y: f64) -> Result<(i32, i32), AutomationError> {
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return Err(AutomationError::BadCoordinates { x, y });
    }
    Ok((x.round() as i32, y.round() as i32))
}

#[cfg(target_os = "macos")]
mod enigo_backend {
    use super::*;
    use enigo::{
        Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse,
        Settings as EnigoSettings,
    };

    /// enigo-backed implementation. Each operation constructs its own
    /// enigo handle inside `spawn_blocking`; the handle is not Send and
    /// device calls can block on the window server.
    pub struct EnigoAutomation;

    impl EnigoAutomation {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for EnigoAutomation {
        fn default() -> Self {
            Self::new()
        }
    }

    fn backend() -> Result<Enigo, AutomationError> {
        Enigo::new(&EnigoSettings::default()).map_err(|e| AutomationError::Backend(e.to_string()))
    }

    struct EnigoSink(Enigo);

    impl LineSink for EnigoSink {
        fn write_line(&mut self, line: &str) -> Result<(), AutomationError> {
            self.0
                .text(line)
                .map_err(|e| AutomationError::Backend(e.to_string()))
        }

        fn press_return(&mut self) -> Result<(), AutomationError> {
            self.0
                .key(Key::Return, Direction::Click)
                .map_err(|e| AutomationError::Backend(e.to_string()))
        }
    }

    async fn run_blocking<T, F>(op: F) -> Result<T, AutomationError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AutomationError> + Send + 'static,
    {
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| AutomationError::Worker(e.to_string()))?
    }

    #[async_trait]
    impl Automation for EnigoAutomation {
        async fn click(&self, x: f64, y: f64) -> Result<(), AutomationError> {
            let (px, py) = check_coordinates(x, y)?;
            run_blocking(move || {
                let mut enigo = backend()?;
                enigo
                    .move_mouse(px, py, Coordinate::Abs)
                    .map_err(|e| AutomationError::Backend(e.to_string()))?;
                enigo
                    .button(Button::Left, Direction::Click)
                    .map_err(|e| AutomationError::Backend(e.to_string()))
            })
            .await
        }

        async fn double_click(&self, x: f64, y: f64) -> Result<(), AutomationError> {
            let (px, py) = check_coordinates(x, y)?;
            run_blocking(move || {
                let mut enigo = backend()?;
                enigo
                    .move_mouse(px, py, Coordinate::Abs)
                    .map_err(|e| AutomationError::Backend(e.to_string()))?;
                for _ in 0..2 {
                    enigo
                        .button(Button::Left, Direction::Click)
                        .map_err(|e| AutomationError::Backend(e.to_string()))?;
                }
                Ok(())
            })
            .await
        }

        async fn type_text(&self, text: &str, budget: TypingBudget) -> Result<(), AutomationError> {
            let text = text.to_string();
            run_blocking(move || {
                let mut sink = EnigoSink(backend()?);
                drive_typing(&mut sink, &text, budget.duration())
            })
            .await
        }

        async fn scroll(
            &self,
            direction: ScrollDirection,
            amount: i32,
        ) -> Result<(), AutomationError> {
            run_blocking(move || {
                let mut enigo = backend()?;
                let (axis, delta) = match direction {
                    ScrollDirection::Up => (Axis::Vertical, -amount),
                    ScrollDirection::Down => (Axis::Vertical, amount),
                    ScrollDirection::Left => (Axis::Horizontal, -amount),
                    ScrollDirection::Right => (Axis::Horizontal, amount),
                };
                enigo
                    .scroll(delta, axis)
                    .map_err(|e| AutomationError::Backend(e.to_string()))
            })
            .await
        }
    }
}

#[cfg(target_os = "macos")]
pub use enigo_backend::EnigoAutomation;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<String>,
        returns: usize,
        delay: Option<Duration>,
    }

    impl LineSink for RecordingSink {
        fn write_line(&mut self, line: &str) -> Result<(), AutomationError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.lines.push(line.to_string());
            Ok(())
        }

        fn press_return(&mut self) -> Result<(), AutomationError> {
            self.returns += 1;
            Ok(())
        }
    }

    #[test]
    fn multi_line_text_keeps_its_shape() {
        let mut sink = RecordingSink::default();
        drive_typing(
            &mut sink,
            "def f(x):\n    return x\n",
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(sink.lines, vec!["def f(x):", "    return x"]);
        // Two breaks: one between the lines, one for the trailing newline.
        assert_eq!(sink.returns, 2);
    }

    #[test]
    fn single_line_needs_no_return() {
        let mut sink = RecordingSink::default();
        drive_typing(&mut sink, "hello world", Duration::from_secs(15)).unwrap();
        assert_eq!(sink.lines, vec!["hello world"]);
        assert_eq!(sink.returns, 0);
    }

    #[test]
    fn blank_interior_lines_still_break() {
        let mut sink = RecordingSink::default();
        drive_typing(&mut sink, "a\n\nb", Duration::from_secs(15)).unwrap();
        assert_eq!(sink.lines, vec!["a", "b"]);
        assert_eq!(sink.returns, 2);
    }

    #[test]
    fn budget_overrun_reports_progress() {
        let mut sink = RecordingSink {
            delay: Some(Duration::from_millis(30)),
            ..RecordingSink::default()
        };
        let err = drive_typing(&mut sink, "a\nb\nc\nd", Duration::from_millis(50)).unwrap_err();
        match err {
            AutomationError::TypingTimeout { typed_lines, .. } => {
                assert!(typed_lines < 4);
                assert!(typed_lines >= 1);
            }
            other => panic!("expected a typing timeout, got {other:?}"),
        }
    }

    #[test]
    fn typing_budgets_match_the_path_contracts() {
        assert_eq!(TypingBudget::Fast.duration(), Duration::from_secs(15));
        assert_eq!(TypingBudget::Slow.duration(), Duration::from_secs(30));
    }

    #[test]
    fn coordinates_are_validated_before_dispatch() {
        assert!(check_coordinates(10.4, 20.6).is_ok());
        assert_eq!(check_coordinates(10.4, 20.6).unwrap(), (10, 21));
        assert!(check_coordinates(f64::NAN, 0.0).is_err());
        assert!(check_coordinates(-5.0, 0.0).is_err());
    }
}
