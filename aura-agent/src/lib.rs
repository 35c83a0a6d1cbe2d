//! Central orchestrator for the aura agent.
//!
//! A natural-language command enters through [`Orchestrator::execute_command`],
//! is classified by the intent recognizer, and is routed to one of the
//! handlers: GUI interaction through the hybrid planner (accessibility
//! fast path with vision fallback), conversation, question answering, or
//! a deferred action that generates content now and places it at a later
//! user click.

mod command;
mod deferred;
mod handlers;
mod health;
mod intent;
mod orchestrator;
mod planner;
mod recovery;
mod trace;
mod traits;

pub use command::{Command, CommandOutcome, CommandStatus, PathUsed};
pub use deferred::{
    clean_content, reformat_single_line, CancelReason, ContentType, DeferredActions,
};
pub use handlers::{ConversationHandler, DeferredHandler, GuiHandler, QuestionHandler};
pub use health::{HealthLevel, ModuleStatus, RecoveryReport, SystemHealth};
pub use intent::{
    classify, CommandType, Intent, IntentKind, IntentParameters, IntentRecognizer,
    ValidationResult,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use planner::{FastPathError, HybridPlanner};
pub use trace::{
    command_tracing_enabled, disable_command_tracing, emit_command_trace,
    enable_command_tracing, subscribe_command_traces, CommandStage, CommandTimeline,
    CommandTraceEvent, StageStatus, TraceAggregator,
};
pub use traits::{
    ActionPlan, Audio, Feedback, ImageHandle, PlanAction, PlanMetadata, PlanStep, Reasoning,
    ResponseFormat, ScreenContext, ScreenElement, SoundCue, SpeakPriority, Vision,
};
