//! Hybrid execution planner: a low-latency accessibility fast path with
//! a vision fallback that must behave like the pre-hybrid pipeline.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use aura_accessibility::{AccessibilityEngine, ElementMatch, EngineError};
use aura_core::{ErrorCategory, Settings};
use aura_input::{Automation, AutomationError, ScrollDirection, TypingBudget};

use crate::command::{Command, CommandOutcome, PathUsed};
use crate::intent::{CommandType, ValidationResult};
use crate::trace::{emit_command_trace, CommandStage, CommandTraceEvent, StageStatus};
use crate::traits::{Feedback, PlanAction, Reasoning, ScreenContext, SoundCue, SpeakPriority, Vision};

const FAST_PATH_SLO_MS: u64 = 2000;
const FALLBACK_SLO_MS: u64 = 10_000;

static TYPE_PAYLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:type|enter|input|write)\s+["'](.+?)["']"#).expect("type payload pattern")
});

/// Why the fast path declined a command. Everything except actuation
/// failures hands the command to the vision pipeline.
#[derive(Debug, Clone, Error)]
pub enum FastPathError {
    #[error("accessibility_not_initialized")]
    NotInitialized,
    #[error("fast_path_disabled")]
    Disabled,
    #[error("permission_denied")]
    PermissionDenied,
    #[error("no_target_in_command")]
    NoTargetInCommand,
    #[error("element_not_found")]
    ElementNotFound,
    #[error("ambiguous_match")]
    AmbiguousMatch,
    #[error("timeout")]
    Timeout,
}

impl From<EngineError> for FastPathError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotInitialized => FastPathError::NotInitialized,
            EngineError::PermissionDenied { .. } => FastPathError::PermissionDenied,
            EngineError::FastPathUnavailable => FastPathError::Disabled,
            EngineError::ElementNotFound { .. } => FastPathError::ElementNotFound,
            EngineError::AmbiguousMatch { .. } => FastPathError::AmbiguousMatch,
            EngineError::Timeout => FastPathError::Timeout,
            EngineError::Provider(_) => FastPathError::ElementNotFound,
        }
    }
}

enum FastAction {
    Click(ElementMatch),
    Scroll(ScrollDirection, i32),
    TypeLiteral(String),
}

pub struct HybridPlanner {
    engine: Option<Arc<AccessibilityEngine>>,
    automation: Arc<dyn Automation>,
    vision: Arc<dyn Vision>,
    reasoning: Arc<dyn Reasoning>,
    feedback: Arc<dyn Feedback>,
    settings: Arc<Settings>,
}

impl HybridPlanner {
    pub fn new(
        engine: Option<Arc<AccessibilityEngine>>,
        automation: Arc<dyn Automation>,
        vision: Arc<dyn Vision>,
        reasoning: Arc<dyn Reasoning>,
        feedback: Arc<dyn Feedback>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            engine,
            automation,
            vision,
            reasoning,
            feedback,
            settings,
        }
    }

    /// Run a GUI command: fast path first, vision on any fast-path miss.
    /// `force_slow` skips the fast path outright (used for screen
    /// questions, which have no element target by construction).
    pub async fn execute(
        &self,
        command: &Command,
        validation: &ValidationResult,
        force_slow: bool,
    ) -> CommandOutcome {
        if !force_slow {
            let started = Instant::now();
            emit_command_trace(CommandTraceEvent::begin(
                command.execution_id,
                CommandStage::FastPath,
            ));

            match self.attempt_fast(command, validation).await {
                Ok(action) => {
                    let outcome = self.dispatch_fast(command, action, started).await;
                    let elapsed = started.elapsed().as_millis() as u64;
                    if elapsed > FAST_PATH_SLO_MS {
                        warn!(elapsed_ms = elapsed, "fast path exceeded its latency target");
                    }
                    return outcome;
                }
                Err(reason) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    emit_command_trace(
                        CommandTraceEvent::finish(
                            command.execution_id,
                            CommandStage::FastPath,
                            StageStatus::Errored,
                            elapsed,
                        )
                        .with_extra(json!({"reason": reason.to_string()})),
                    );
                    info!(reason = %reason, "fast path declined; falling back to vision");
                    return self.run_fallback(command, Some(reason)).await;
                }
            }
        }

        self.run_fallback(command, None).await
    }

    async fn attempt_fast(
        &self,
        command: &Command,
        validation: &ValidationResult,
    ) -> Result<FastAction, FastPathError> {
        if !self.settings.fast_path_enabled {
            return Err(FastPathError::Disabled);
        }
        let engine = self.engine.as_ref().ok_or(FastPathError::NotInitialized)?;

        // A literal payload needs no element: type it where the caret is.
        if validation.command_type == CommandType::Type {
            if let Some(payload) = extract_type_payload(&command.raw_text) {
                return Ok(FastAction::TypeLiteral(payload));
            }
        }

        // A viewport scroll needs no element either.
        if validation.command_type == CommandType::Scroll {
            let (direction, amount) = parse_scroll(&command.normalized_text);
            return Ok(FastAction::Scroll(direction, amount));
        }

        let target = engine
            .extract_target(&command.normalized_text)
            .ok_or(FastPathError::NoTargetInCommand)?;
        debug!(target = %target.target, confidence = target.confidence, "searching fast path target");

        let hit = {
            let engine = Arc::clone(engine);
            let label = target.target.clone();
            tokio::task::spawn_blocking(move || engine.find_element("", &label, None))
                .await
                .map_err(|_| FastPathError::Timeout)??
        };

        Ok(FastAction::Click(hit))
    }

    async fn dispatch_fast(
        &self,
        command: &Command,
        action: FastAction,
        started: Instant,
    ) -> CommandOutcome {
        let result = match &action {
            FastAction::Click(hit) => {
                let (x, y) = hit.coordinates;
                debug!(x, y, attribute = %hit.matched_attribute, score = hit.score, "fast path click");
                retry_once(|| self.automation.click(x, y)).await
            }
            FastAction::Scroll(direction, amount) => {
                let (direction, amount) = (*direction, *amount);
                retry_once(|| self.automation.scroll(direction, amount)).await
            }
            FastAction::TypeLiteral(text) => {
                let text = text.clone();
                retry_once(move || {
                    let text = text.clone();
                    let automation = Arc::clone(&self.automation);
                    async move { automation.type_text(&text, TypingBudget::Fast).await }
                })
                .await
            }
        };

        let elapsed = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                emit_command_trace(CommandTraceEvent::finish(
                    command.execution_id,
                    CommandStage::FastPath,
                    StageStatus::Completed,
                    elapsed,
                ));
                self.feedback.play(SoundCue::Success).await;
                CommandOutcome::completed(command.execution_id)
                    .with_path(PathUsed::Fast)
                    .with_duration(elapsed)
            }
            Err(e) => {
                emit_command_trace(CommandTraceEvent::finish(
                    command.execution_id,
                    CommandStage::FastPath,
                    StageStatus::Errored,
                    elapsed,
                ));
                self.feedback.play(SoundCue::Failure).await;
                CommandOutcome::failed(command.execution_id, format!("automation failed: {e}"))
                    .with_path(PathUsed::Fast)
                    .with_duration(elapsed)
            }
        }
    }

    /// The legacy pipeline: capture, analyze, plan, act. The original
    /// command and the fast-path failure reason travel as context.
    async fn run_fallback(
        &self,
        command: &Command,
        fast_reason: Option<FastPathError>,
    ) -> CommandOutcome {
        let started = Instant::now();
        emit_command_trace(CommandTraceEvent::begin(
            command.execution_id,
            CommandStage::Fallback,
        ));
        self.feedback.play(SoundCue::Thinking).await;

        let outcome = self.run_fallback_inner(command, fast_reason).await;

        let elapsed = started.elapsed().as_millis() as u64;
        if elapsed > FALLBACK_SLO_MS {
            warn!(elapsed_ms = elapsed, "vision fallback exceeded its latency target");
        }
        let status = if outcome.is_success() {
            StageStatus::Completed
        } else {
            StageStatus::Errored
        };
        emit_command_trace(CommandTraceEvent::finish(
            command.execution_id,
            CommandStage::Fallback,
            status,
            elapsed,
        ));
        outcome.with_duration(elapsed)
    }

    async fn run_fallback_inner(
        &self,
        command: &Command,
        fast_reason: Option<FastPathError>,
    ) -> CommandOutcome {
        let image = match self.vision.capture_screen().await {
            Ok(image) => image,
            Err(e) => {
                self.feedback.play(SoundCue::Failure).await;
                return CommandOutcome::failed(
                    command.execution_id,
                    format!("screen capture failed: {e}"),
                )
                .with_path(PathUsed::Slow);
            }
        };

        let prompt = match &fast_reason {
            Some(reason) => format!(
                "Describe the interactive elements relevant to: {}. \
                 The accessibility path failed with: {}.",
                command.raw_text, reason
            ),
            None => format!(
                "Describe the interactive elements relevant to: {}.",
                command.raw_text
            ),
        };

        let context = match crate::recovery::with_retries(ErrorCategory::Api, || {
            self.vision.analyze(&image, &prompt)
        })
        .await
        {
            Ok(context) => context,
            Err(e) => {
                self.feedback.play(SoundCue::Failure).await;
                return CommandOutcome::failed(
                    command.execution_id,
                    format!("vision analysis failed: {e}"),
                )
                .with_path(PathUsed::Slow);
            }
        };

        let plan = match crate::recovery::with_retries(ErrorCategory::Api, || {
            self.reasoning.get_action_plan(&command.raw_text, &context)
        })
        .await
        {
            Ok(plan) => plan,
            Err(e) => {
                self.feedback.play(SoundCue::Failure).await;
                return CommandOutcome::failed(
                    command.execution_id,
                    format!("planning failed: {e}"),
                )
                .with_path(PathUsed::Slow);
            }
        };

        if plan.plan.is_empty() {
            self.feedback.play(SoundCue::Failure).await;
            return CommandOutcome::failed(command.execution_id, "empty action plan")
                .with_path(PathUsed::Slow);
        }

        match self.execute_plan(&plan, &context).await {
            Ok(()) => {
                self.feedback.play(SoundCue::Success).await;
                CommandOutcome::completed(command.execution_id).with_path(PathUsed::Slow)
            }
            Err(e) => {
                self.feedback.play(SoundCue::Failure).await;
                CommandOutcome::failed(command.execution_id, e).with_path(PathUsed::Slow)
            }
        }
    }

    async fn execute_plan(
        &self,
        plan: &crate::traits::ActionPlan,
        _context: &ScreenContext,
    ) -> Result<(), String> {
        for (index, step) in plan.plan.iter().enumerate() {
            match step.action {
                PlanAction::Click | PlanAction::DoubleClick => {
                    let [x, y] = step
                        .coordinates
                        .ok_or_else(|| format!("step {index}: click without coordinates"))?;
                    let result = if step.action == PlanAction::Click {
                        retry_once(|| self.automation.click(x, y)).await
                    } else {
                        retry_once(|| self.automation.double_click(x, y)).await
                    };
                    result.map_err(|e| format!("step {index}: {e}"))?;
                }
                PlanAction::Type => {
                    let text = step
                        .text
                        .clone()
                        .ok_or_else(|| format!("step {index}: type without text"))?;
                    let automation = Arc::clone(&self.automation);
                    retry_once(move || {
                        let text = text.clone();
                        let automation = Arc::clone(&automation);
                        async move { automation.type_text(&text, TypingBudget::Slow).await }
                    })
                    .await
                    .map_err(|e| format!("step {index}: {e}"))?;
                }
                PlanAction::Scroll => {
                    let direction = match step.direction.as_deref() {
                        Some("up") => ScrollDirection::Up,
                        Some("left") => ScrollDirection::Left,
                        Some("right") => ScrollDirection::Right,
                        _ => ScrollDirection::Down,
                    };
                    let amount = step.amount.unwrap_or(3);
                    retry_once(|| self.automation.scroll(direction, amount))
                        .await
                        .map_err(|e| format!("step {index}: {e}"))?;
                }
                PlanAction::Speak => {
                    if let Some(message) = &step.message {
                        self.feedback.speak(message, SpeakPriority::Normal).await;
                    }
                }
                PlanAction::Finish => break,
            }
        }
        Ok(())
    }
}

/// Mouse and keyboard actuation gets exactly one retry before the
/// failure is surfaced.
async fn retry_once<F, Fut>(op: F) -> Result<(), AutomationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), AutomationError>>,
{
    match op().await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(error = %first, "input actuation failed; retrying once");
            op().await
        }
    }
}

fn extract_type_payload(raw: &str) -> Option<String> {
    TYPE_PAYLOAD
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_scroll(normalized: &str) -> (ScrollDirection, i32) {
    let direction = if normalized.contains("up") {
        ScrollDirection::Up
    } else if normalized.contains("left") {
        ScrollDirection::Left
    } else if normalized.contains("right") {
        ScrollDirection::Right
    } else {
        ScrollDirection::Down
    };
    let amount = if normalized.starts_with("page") { 10 } else { 3 };
    (direction, amount)
}
