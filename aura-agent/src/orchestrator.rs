//! The orchestrator: one struct owning the locks, the recognizer, the
//! deferred subsystem, and the handlers. A command runs Steps 0-5 under
//! the execution lock; a deferred action releases that lock by returning
//! `waiting_for_user_action` while its workflow continues in the
//! background under the deferred lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aura_accessibility::AccessibilityEngine;
use aura_core::{MetricsBuffer, PerformanceMetric, Settings, Thresholds};
use aura_input::{Automation, MouseListener};

use crate::command::{Command, CommandOutcome, CommandStatus};
use crate::deferred::{CancelReason, DeferredActions};
use crate::handlers::{ConversationHandler, DeferredHandler, GuiHandler, QuestionHandler};
use crate::health::{assess, ModuleStatus, RecoveryReport, SystemHealth};
use crate::intent::{
    classify, normalize_command, route_intent, IntentKind, IntentRecognizer,
};
use crate::planner::HybridPlanner;
use crate::recovery::{report_terminal_failure, RecoveryRegistry};
use crate::trace::{emit_command_trace, CommandStage, CommandTraceEvent, StageStatus};
use crate::traits::{Feedback, Reasoning, SpeakPriority, Vision};

pub struct OrchestratorBuilder {
    settings: Arc<Settings>,
    engine: Option<Arc<AccessibilityEngine>>,
    reasoning: Arc<dyn Reasoning>,
    vision: Arc<dyn Vision>,
    automation: Arc<dyn Automation>,
    listener: Arc<dyn MouseListener>,
    feedback: Arc<dyn Feedback>,
}

impl OrchestratorBuilder {
    pub fn new(
        reasoning: Arc<dyn Reasoning>,
        vision: Arc<dyn Vision>,
        automation: Arc<dyn Automation>,
        listener: Arc<dyn MouseListener>,
        feedback: Arc<dyn Feedback>,
    ) -> Self {
        Self {
            settings: Arc::new(Settings::default()),
            engine: None,
            reasoning,
            vision,
            automation,
            listener,
            feedback,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn accessibility_engine(mut self, engine: Arc<AccessibilityEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Assemble the orchestrator and spawn its click worker. Must run
    /// inside a tokio runtime.
    pub fn build(self) -> Arc<Orchestrator> {
        let (deferred, mut click_rx) = DeferredActions::new(
            Arc::clone(&self.listener),
            Arc::clone(&self.automation),
            Arc::clone(&self.feedback),
            self.settings.locks.deferred(),
        );

        let planner = Arc::new(HybridPlanner::new(
            self.engine.clone(),
            Arc::clone(&self.automation),
            Arc::clone(&self.vision),
            Arc::clone(&self.reasoning),
            Arc::clone(&self.feedback),
            Arc::clone(&self.settings),
        ));

        let recognizer = IntentRecognizer::new(Arc::clone(&self.reasoning), Arc::clone(&self.settings));
        let gui = GuiHandler::new(Arc::clone(&planner));
        let question = QuestionHandler::new(Arc::clone(&planner));
        let conversation = ConversationHandler::new(
            Arc::clone(&self.reasoning),
            Arc::clone(&self.feedback),
            self.settings.conversation_context_size,
        );
        let deferred_handler = DeferredHandler::new(
            Arc::clone(&self.reasoning),
            Arc::clone(&self.feedback),
            Arc::clone(&deferred),
            Arc::clone(&self.settings),
        );

        let thresholds = Thresholds {
            warn_ms: self.settings.perf_warn_ms,
            crit_ms: self.settings.perf_crit_ms,
        };
        let metrics = MetricsBuffer::new(self.settings.metrics_capacity, thresholds);

        let modules = DashMap::new();
        modules.insert("intent".to_string(), ModuleStatus::Healthy);
        modules.insert("deferred".to_string(), ModuleStatus::Healthy);
        modules.insert("automation".to_string(), ModuleStatus::Healthy);

        // Click events re-enter through this queue so the listener thread
        // never touches orchestrator locks directly.
        let click_worker = {
            let deferred = Arc::clone(&deferred);
            tokio::spawn(async move {
                while click_rx.recv().await.is_some() {
                    deferred.handle_click().await;
                }
                debug!("click worker stopped");
            })
        };

        Arc::new(Orchestrator {
            settings: self.settings,
            execution_lock: Arc::new(Mutex::new(())),
            recognizer,
            deferred,
            gui,
            question,
            conversation,
            deferred_handler,
            engine: self.engine,
            feedback: self.feedback,
            metrics,
            modules,
            recovery: RecoveryRegistry::default(),
            _click_worker: click_worker,
        })
    }
}

pub struct Orchestrator {
    settings: Arc<Settings>,
    execution_lock: Arc<Mutex<()>>,
    recognizer: IntentRecognizer,
    deferred: Arc<DeferredActions>,
    gui: GuiHandler,
    question: QuestionHandler,
    conversation: ConversationHandler,
    deferred_handler: DeferredHandler,
    engine: Option<Arc<AccessibilityEngine>>,
    feedback: Arc<dyn Feedback>,
    metrics: MetricsBuffer,
    modules: DashMap<String, ModuleStatus>,
    recovery: RecoveryRegistry,
    _click_worker: JoinHandle<()>,
}

impl Orchestrator {
    pub fn builder(
        reasoning: Arc<dyn Reasoning>,
        vision: Arc<dyn Vision>,
        automation: Arc<dyn Automation>,
        listener: Arc<dyn MouseListener>,
        feedback: Arc<dyn Feedback>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(reasoning, vision, automation, listener, feedback)
    }

    /// Run one command through the pipeline. At most one command is in
    /// flight; a new command pre-empts any deferred action still waiting
    /// for its click.
    pub async fn execute_command(&self, text: &str) -> CommandOutcome {
        let started = Instant::now();

        // Step 0: clear any pending deferred action before taking the
        // execution lock. The listener stops before the state clears, so
        // a click landing mid-preemption cannot trigger placement.
        if self.deferred.interrupt(CancelReason::Interrupted).await {
            info!("pre-empted a waiting deferred action");
        }

        // Step 1: single in-flight command.
        let guard = match tokio::time::timeout(
            self.settings.locks.execution(),
            Arc::clone(&self.execution_lock).lock_owned(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!("execution lock timed out; rejecting command");
                return CommandOutcome::failed(Uuid::new_v4(), "execution_lock_timeout")
                    .with_duration(started.elapsed().as_millis() as u64);
            }
        };

        if self.settings.snapshot_prefetch {
            if let Some(engine) = &self.engine {
                engine.prefetch_frontmost();
            }
        }

        // Step 2: validation and preprocessing.
        let normalized = normalize_command(text);
        if normalized.is_empty() {
            drop(guard);
            return CommandOutcome::failed(Uuid::new_v4(), "empty_command")
                .with_duration(started.elapsed().as_millis() as u64);
        }
        let command = Command::new(text, normalized);
        let validation = classify(&command.normalized_text);
        emit_command_trace(
            CommandTraceEvent::finish(
                command.execution_id,
                CommandStage::Validation,
                StageStatus::Completed,
                started.elapsed().as_millis() as u64,
            )
            .with_extra(json!({
                "command_type": validation.command_type,
                "confidence": validation.confidence,
            })),
        );

        // Step 3: intent recognition (degrades internally, never fails).
        let intent_started = Instant::now();
        let intent = self.recognizer.recognize(&command.normalized_text).await;
        emit_command_trace(
            CommandTraceEvent::finish(
                command.execution_id,
                CommandStage::Intent,
                StageStatus::Completed,
                intent_started.elapsed().as_millis() as u64,
            )
            .with_extra(json!({"intent": intent.intent, "confidence": intent.confidence})),
        );

        // Step 4: routing.
        let route = route_intent(&intent, &validation, &self.settings);
        debug!(execution_id = %command.execution_id, ?route, "routing command");
        let outcome = match route {
            IntentKind::GuiInteraction => self.gui.handle(&command, &validation).await,
            IntentKind::QuestionAnswering => self.question.handle(&command, &validation).await,
            IntentKind::ConversationalChat => self.conversation.handle(&command).await,
            IntentKind::DeferredAction => self.deferred_handler.handle(&command, &intent).await,
        };

        // Step 5: finalization. Returning drops the owned guard on every
        // path; for a waiting outcome that release is what lets the next
        // command pre-empt the deferred workflow.
        drop(guard);

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = outcome.with_duration(duration_ms);
        self.metrics.record(
            PerformanceMetric::new("execute_command", started.elapsed(), outcome.is_success())
                .with_metadata(json!({
                    "status": outcome.status,
                    "route": route,
                    "path": outcome.path_used,
                })),
        );

        if outcome.status == CommandStatus::Failed {
            let reason = outcome
                .errors
                .first()
                .map(String::as_str)
                .unwrap_or("unknown failure");
            let classified = report_terminal_failure(outcome.execution_id, reason);
            self.feedback
                .speak(&classified.message, SpeakPriority::Normal)
                .await;
        }

        outcome
    }

    /// True while a deferred action is armed and waiting for its click.
    pub async fn is_waiting_for_user_action(&self) -> bool {
        self.deferred.is_waiting().await
    }

    /// Explicit user cancel of a pending deferred action.
    pub async fn cancel_pending_action(&self) -> bool {
        self.deferred.interrupt(CancelReason::Cancelled).await
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        let mut modules: HashMap<String, ModuleStatus> = self
            .modules
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        if let Some(engine) = &self.engine {
            let status = if engine.permission_state().degraded_mode {
                ModuleStatus::Degraded
            } else {
                match engine.success_rate() {
                    Some(rate) if rate < 0.5 => ModuleStatus::Degraded,
                    _ => ModuleStatus::Healthy,
                }
            };
            modules.insert("accessibility".to_string(), status);
        } else {
            modules.insert("accessibility".to_string(), ModuleStatus::Failed);
        }

        assess(modules, &self.metrics)
    }

    /// Try to reinitialize one module (default: accessibility). Attempts
    /// are bounded per process lifetime.
    pub async fn attempt_system_recovery(&self, module: Option<&str>) -> RecoveryReport {
        let module = module.unwrap_or("accessibility").to_string();
        if !self.recovery.try_begin(&module) {
            return RecoveryReport {
                module,
                attempted: false,
                succeeded: false,
            };
        }

        let succeeded = match module.as_str() {
            "accessibility" => match &self.engine {
                Some(engine) => {
                    engine.clear_caches();
                    let state = engine.refresh_permissions();
                    !state.degraded_mode
                }
                None => false,
            },
            "intent" => {
                self.recognizer.clear_cache();
                true
            }
            other => {
                warn!(module = other, "no recovery procedure for module");
                false
            }
        };

        info!(module = %module, succeeded, "module recovery attempted");
        if let Some(mut status) = self.modules.get_mut(&module) {
            *status = if succeeded {
                ModuleStatus::Healthy
            } else {
                ModuleStatus::Failed
            };
        }

        RecoveryReport {
            module,
            attempted: true,
            succeeded,
        }
    }
}
