use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};

use aura_core::Settings;

use crate::command::{Command, CommandOutcome};
use crate::deferred::{clean_content, reformat_single_line, ContentType, DeferredActions};
use crate::intent::Intent;
use crate::trace::{emit_command_trace, CommandStage, CommandTraceEvent, StageStatus};
use crate::traits::{Feedback, Reasoning, ResponseFormat, SoundCue, SpeakPriority};

/// Entry point for deferred actions: generate the content, announce it,
/// then hand the armed wait over to [`DeferredActions`]. On generation
/// failure nothing is armed.
pub struct DeferredHandler {
    reasoning: Arc<dyn Reasoning>,
    feedback: Arc<dyn Feedback>,
    deferred: Arc<DeferredActions>,
    settings: Arc<Settings>,
}

impl DeferredHandler {
    pub fn new(
        reasoning: Arc<dyn Reasoning>,
        feedback: Arc<dyn Feedback>,
        deferred: Arc<DeferredActions>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            reasoning,
            feedback,
            deferred,
            settings,
        }
    }

    pub async fn handle(&self, command: &Command, intent: &Intent) -> CommandOutcome {
        let request = intent
            .parameters
            .content_request
            .as_deref()
            .unwrap_or(&command.raw_text);
        let content_type = ContentType::from_hint(
            intent.parameters.content_type.as_deref(),
            request,
        );

        emit_command_trace(
            CommandTraceEvent::begin(command.execution_id, CommandStage::Deferred)
                .with_extra(json!({"content_type": content_type})),
        );
        let started = Instant::now();
        self.feedback.play(SoundCue::Thinking).await;

        let prompt = match content_type {
            ContentType::Code => format!(
                "Generate only the code for this request, no commentary: {request}"
            ),
            _ => format!("Generate only the requested content, no commentary: {request}"),
        };

        let generated = match self
            .reasoning
            .generate(&prompt, 1500, ResponseFormat::Text)
            .await
        {
            Ok(generated) => generated,
            Err(e) => {
                warn!(error = %e, "deferred content generation failed");
                emit_command_trace(CommandTraceEvent::finish(
                    command.execution_id,
                    CommandStage::Deferred,
                    StageStatus::Errored,
                    started.elapsed().as_millis() as u64,
                ));
                self.feedback.play(SoundCue::Failure).await;
                self.feedback
                    .speak("I couldn't generate that content.", SpeakPriority::High)
                    .await;
                return CommandOutcome::failed(
                    command.execution_id,
                    format!("generation failed: {e}"),
                );
            }
        };

        let cleaned = clean_content(&generated);
        let payload = reformat_single_line(&cleaned, content_type);
        if payload.trim().is_empty() {
            self.feedback.play(SoundCue::Failure).await;
            return CommandOutcome::failed(command.execution_id, "generated content was empty");
        }

        // Announce before arming so the user knows a click is expected.
        self.feedback
            .speak(
                "Ready. Click where you want me to place it.",
                SpeakPriority::High,
            )
            .await;

        if let Err(e) = self
            .deferred
            .begin_waiting(
                command.execution_id,
                payload,
                content_type,
                self.settings.deferred_action_timeout(),
            )
            .await
        {
            warn!(error = %e, "failed to arm deferred action");
            emit_command_trace(CommandTraceEvent::finish(
                command.execution_id,
                CommandStage::Deferred,
                StageStatus::Errored,
                started.elapsed().as_millis() as u64,
            ));
            self.feedback.play(SoundCue::Failure).await;
            return CommandOutcome::failed(command.execution_id, e);
        }

        info!(execution_id = %command.execution_id, "deferred action armed");
        CommandOutcome::waiting(command.execution_id)
            .with_duration(started.elapsed().as_millis() as u64)
    }
}
