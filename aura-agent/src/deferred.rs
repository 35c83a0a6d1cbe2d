//! Deferred actions: generate content now, place it at the user's next
//! click. The state lives behind its own lock; the mouse listener
//! re-enters through a queued message rather than calling into the
//! orchestrator from the hook thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aura_input::{Automation, MouseListener, TypingBudget};

use crate::trace::{emit_command_trace, CommandStage, CommandTraceEvent, StageStatus};
use crate::traits::{Feedback, SoundCue, SpeakPriority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    Text,
    Other,
}

impl ContentType {
    /// Map the recognizer's content-type hint, falling back to cues in
    /// the request itself.
    pub fn from_hint(hint: Option<&str>, request: &str) -> Self {
        match hint {
            Some("code") => ContentType::Code,
            Some("text") => ContentType::Text,
            Some(_) => ContentType::Other,
            None => {
                let lower = request.to_lowercase();
                if ["code", "function", "script", "snippet"]
                    .iter()
                    .any(|cue| lower.contains(cue))
                {
                    ContentType::Code
                } else {
                    ContentType::Text
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Pre-empted by a new command.
    Interrupted,
    /// No click arrived before the deadline.
    TimedOut,
    /// Explicit user cancel.
    Cancelled,
}

struct DeferredActionState {
    execution_id: Uuid,
    payload: String,
    content_type: ContentType,
    started_at: Instant,
    timeout: Duration,
    executing: bool,
    timer: Option<JoinHandle<()>>,
}

/// The deferred-action subsystem. Owns the single state slot and its
/// lock; the orchestrator pre-empts through [`DeferredActions::interrupt`]
/// and the click worker triggers placement through
/// [`DeferredActions::handle_click`].
pub struct DeferredActions {
    state: Mutex<Option<DeferredActionState>>,
    listener: Arc<dyn MouseListener>,
    automation: Arc<dyn Automation>,
    feedback: Arc<dyn Feedback>,
    lock_timeout: Duration,
    click_tx: mpsc::UnboundedSender<()>,
}

impl DeferredActions {
    pub fn new(
        listener: Arc<dyn MouseListener>,
        automation: Arc<dyn Automation>,
        feedback: Arc<dyn Feedback>,
        lock_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (click_tx, click_rx) = mpsc::unbounded_channel();
        let actions = Arc::new(Self {
            state: Mutex::new(None),
            listener,
            automation,
            feedback,
            lock_timeout,
            click_tx,
        });
        (actions, click_rx)
    }

    /// True while a deferred action is waiting on a user click.
    pub async fn is_waiting(&self) -> bool {
        let state = self.state.lock().await;
        state.is_some() && self.listener.is_armed()
    }

    /// Arm the workflow after content generation: start the mouse
    /// listener and the timeout timer, then store the state. On listener
    /// failure nothing is armed and the state stays empty.
    pub async fn begin_waiting(
        self: &Arc<Self>,
        execution_id: Uuid,
        payload: String,
        content_type: ContentType,
        timeout: Duration,
    ) -> Result<(), String> {
        let mut guard = match tokio::time::timeout(self.lock_timeout, self.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err("deferred state is busy".to_string()),
        };

        if let Some(previous) = guard.take() {
            warn!(
                previous = %previous.execution_id,
                "replacing a deferred action that was never cleaned up"
            );
            self.listener.stop();
            if let Some(timer) = previous.timer {
                timer.abort();
            }
        }

        let tx = self.click_tx.clone();
        let callback: aura_input::ClickCallback = Arc::new(move || {
            let _ = tx.send(());
        });
        if let Err(e) = self.listener.start(callback) {
            return Err(format!("mouse listener failed to start: {e}"));
        }

        let timer = {
            let actions = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                actions.expire(execution_id).await;
            })
        };

        *guard = Some(DeferredActionState {
            execution_id,
            payload,
            content_type,
            started_at: Instant::now(),
            timeout,
            executing: false,
            timer: Some(timer),
        });

        info!(execution_id = %execution_id, timeout_s = timeout.as_secs(), "deferred action waiting for click");
        Ok(())
    }

    /// Click-triggered placement. Guarded by the `executing` flag so a
    /// duplicate click delivery is a no-op; the listener is stopped
    /// before coordinates are read so a second physical click cannot
    /// re-enter mid-placement.
    pub async fn handle_click(self: &Arc<Self>) {
        let mut guard = match tokio::time::timeout(self.lock_timeout, self.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("deferred lock busy during click handling; dropping click");
                return;
            }
        };

        let Some(state) = guard.as_mut() else {
            debug!("click arrived with no deferred action pending");
            return;
        };
        if state.executing {
            debug!("placement already executing; ignoring duplicate click");
            return;
        }
        state.executing = true;

        self.listener.stop();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let execution_id = state.execution_id;
        let payload = state.payload.clone();
        let waited_ms = state.started_at.elapsed().as_millis() as u64;
        let coordinates = self.listener.last_click();

        emit_command_trace(
            CommandTraceEvent::begin(execution_id, CommandStage::Placement).with_extra(
                serde_json::json!({
                    "waited_ms": waited_ms,
                    "content_type": state.content_type,
                    "timeout_s": state.timeout.as_secs(),
                }),
            ),
        );
        let placement_started = Instant::now();

        let result = match coordinates {
            Some((x, y)) => self.place(x, y, &payload).await,
            None => Err("listener reported no click coordinates".to_string()),
        };

        let elapsed = placement_started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                emit_command_trace(CommandTraceEvent::finish(
                    execution_id,
                    CommandStage::Placement,
                    StageStatus::Completed,
                    elapsed,
                ));
                self.feedback.play(SoundCue::Success).await;
                self.feedback
                    .speak("Content placed.", SpeakPriority::Normal)
                    .await;
            }
            Err(e) => {
                emit_command_trace(CommandTraceEvent::finish(
                    execution_id,
                    CommandStage::Placement,
                    StageStatus::Errored,
                    elapsed,
                ));
                warn!(execution_id = %execution_id, error = %e, "deferred placement failed");
                self.feedback.play(SoundCue::Failure).await;
                self.feedback
                    .speak("I couldn't place the content.", SpeakPriority::High)
                    .await;
            }
        }

        // Guaranteed reset: the slot empties whatever placement did.
        *guard = None;
    }

    async fn place(&self, x: f64, y: f64, payload: &str) -> Result<(), String> {
        debug!(x, y, bytes = payload.len(), "placing deferred content");
        let click = match self.automation.click(x, y).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "placement click failed; retrying once");
                self.automation.click(x, y).await
            }
        };
        click.map_err(|e| format!("click failed: {e}"))?;

        let typed = match self.automation.type_text(payload, TypingBudget::Slow).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "placement typing failed; retrying once");
                self.automation.type_text(payload, TypingBudget::Slow).await
            }
        };
        typed.map_err(|e| format!("typing failed: {e}"))
    }

    /// Cancel a pending deferred action. Idempotent: a second call on the
    /// same state is a no-op. The listener stops before the state clears
    /// so a late click cannot trigger placement.
    pub async fn interrupt(&self, reason: CancelReason) -> bool {
        let mut guard = match tokio::time::timeout(self.lock_timeout, self.state.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("deferred lock busy; proceeding without reset");
                return false;
            }
        };

        let Some(state) = guard.as_ref() else {
            return false;
        };
        if state.executing {
            debug!("placement in flight; not interrupting");
            return false;
        }

        self.listener.stop();
        let state = guard.take();
        if let Some(mut state) = state {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            info!(execution_id = %state.execution_id, ?reason, "deferred action cancelled");
            emit_command_trace(CommandTraceEvent::finish(
                state.execution_id,
                CommandStage::Deferred,
                StageStatus::Skipped,
                state.started_at.elapsed().as_millis() as u64,
            ));
        }

        match reason {
            CancelReason::TimedOut => {
                self.feedback.play(SoundCue::Failure).await;
                self.feedback
                    .speak("The pending action timed out.", SpeakPriority::Normal)
                    .await;
            }
            CancelReason::Cancelled => {
                self.feedback
                    .speak("Cancelled the pending action.", SpeakPriority::Normal)
                    .await;
            }
            CancelReason::Interrupted => {
                debug!("deferred action pre-empted by a new command");
            }
        }
        true
    }

    async fn expire(self: &Arc<Self>, execution_id: Uuid) {
        {
            let guard = self.state.lock().await;
            match guard.as_ref() {
                Some(state) if state.execution_id == execution_id && !state.executing => {}
                _ => return,
            }
        }
        info!(execution_id = %execution_id, "deferred action timed out");
        self.interrupt(CancelReason::TimedOut).await;
    }
}

static FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("fence pattern")
});
static LEADING_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(here('s| is| are| you go)?|sure|certainly|of course|okay|ok)\b[^\n]*:?\s*$")
        .expect("leading boilerplate pattern")
});
static TRAILING_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(let me know|hope (this|that) helps|feel free)\b").expect("trailing pattern")
});

/// Strip fences and boilerplate from generated content while preserving
/// interior newlines and indentation exactly.
pub fn clean_content(raw: &str) -> String {
    // A fenced block wins outright; everything around it is wrapper.
    if let Some(captures) = FENCED.captures(raw) {
        if let Some(body) = captures.get(1) {
            return body.as_str().to_string();
        }
    }

    let lines: Vec<&str> = raw.lines().collect();
    let mut start = 0;
    while start < lines.len() {
        let line = lines[start].trim();
        if line.is_empty() || LEADING_BOILERPLATE.is_match(line) {
            start += 1;
        } else {
            break;
        }
    }

    let mut end = lines.len();
    while end > start {
        let line = lines[end - 1].trim();
        if line.is_empty() || TRAILING_BOILERPLATE.is_match(line) {
            end -= 1;
        } else {
            break;
        }
    }

    lines[start..end].join("\n")
}

/// Minimum length before the single-line reformatter considers content
/// to be a flattened block rather than a short expression.
const REFORMAT_MIN_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeLanguage {
    Python,
    JavaScript,
}

fn detect_language(content: &str) -> Option<CodeLanguage> {
    let has_braces = content.contains('{') && content.contains(';');
    if content.contains("function ") || content.contains("=>") || has_braces {
        return Some(CodeLanguage::JavaScript);
    }
    if content.contains("def ") || content.contains("lambda ") || content.contains(": ") {
        return Some(CodeLanguage::Python);
    }
    None
}

/// Re-introduce line structure into code that was generated as one long
/// line. Only runs for code content with no newlines beyond the length
/// floor; unknown languages pass through unchanged, and no tokens are
/// ever added or removed.
pub fn reformat_single_line(content: &str, content_type: ContentType) -> String {
    if content_type != ContentType::Code
        || content.contains('\n')
        || content.len() <= REFORMAT_MIN_LEN
    {
        return content.to_string();
    }

    match detect_language(content) {
        Some(CodeLanguage::Python) => reformat_python(content),
        Some(CodeLanguage::JavaScript) => reformat_javascript(content),
        None => content.to_string(),
    }
}

const PYTHON_INDENT: &str = "    ";
const PYTHON_STATEMENTS: [&str; 6] = ["for ", "if ", "while ", "return ", "elif ", "else:"];

/// Split at block headers (`:` followed by more code) and statement
/// keywords. Indentation grows after each header; a statement after a
/// `return` drops back to function-body level.
fn reformat_python(line: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut indent: usize = 0;
    let mut saw_def = false;
    let mut rest = line.trim();

    while !rest.is_empty() {
        // Earliest break: a ':' that ends a block header, or the start of
        // the next statement keyword.
        let colon = find_header_colon(rest);
        let keyword = PYTHON_STATEMENTS
            .iter()
            .filter_map(|kw| find_keyword(rest, kw))
            .min();

        let (segment, remainder, opens_block) = match (colon, keyword) {
            (Some(c), Some(k)) if c < k => (&rest[..=c], rest[c + 1..].trim_start(), true),
            (Some(c), None) => (&rest[..=c], rest[c + 1..].trim_start(), true),
            (_, Some(k)) if k > 0 => (&rest[..k], rest[k..].trim_start(), false),
            _ => (rest, "", false),
        };

        let segment = segment.trim();
        if segment.is_empty() {
            rest = remainder;
            continue;
        }

        out.push(format!("{}{}", PYTHON_INDENT.repeat(indent), segment));
        if segment.starts_with("def ") {
            saw_def = true;
        }

        if opens_block {
            indent += 1;
        } else if segment.starts_with("return ") || segment == "return" {
            // The next statement belongs to the enclosing body.
            indent = if saw_def { 1 } else { 0 };
        }
        rest = remainder;
    }

    out.join("\n")
}

/// Position of a ':' that ends a block header: followed by a space and
/// more code, and not inside brackets.
fn find_header_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b':' if depth == 0 => {
                if i + 1 < bytes.len() && bytes[i + 1] == b' ' {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Position of `keyword` at a word boundary past the start of the text.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let mut from = 1;
    while let Some(found) = text[from..].find(keyword) {
        let at = from + found;
        let boundary = text.as_bytes().get(at.wrapping_sub(1)) == Some(&b' ');
        if boundary {
            return Some(at);
        }
        from = at + keyword.len();
    }
    None
}

const JS_INDENT: &str = "  ";

/// Break after `{` and `;`, and put each `}` on its own line one level
/// out.
fn reformat_javascript(line: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut indent: usize = 0;

    let flush = |out: &mut Vec<String>, current: &mut String, indent: usize| {
        let segment = current.trim();
        if !segment.is_empty() {
            out.push(format!("{}{}", JS_INDENT.repeat(indent), segment));
        }
        current.clear();
    };

    for ch in line.chars() {
        match ch {
            '{' => {
                current.push(ch);
                flush(&mut out, &mut current, indent);
                indent += 1;
            }
            ';' => {
                current.push(ch);
                flush(&mut out, &mut current, indent);
            }
            '}' => {
                flush(&mut out, &mut current, indent);
                indent = indent.saturating_sub(1);
                out.push(format!("{}}}", JS_INDENT.repeat(indent)));
            }
            _ => current.push(ch),
        }
    }
    flush(&mut out, &mut current, indent);

    out.join("\n")
}
