use std::sync::Arc;

use crate::command::{Command, CommandOutcome};
use crate::intent::ValidationResult;
use crate::planner::HybridPlanner;

/// Questions about the screen have no element target, so the planner
/// runs the vision pipeline directly; the resulting plan answers through
/// its speak steps.
pub struct QuestionHandler {
    planner: Arc<HybridPlanner>,
}

impl QuestionHandler {
    pub fn new(planner: Arc<HybridPlanner>) -> Self {
        Self { planner }
    }

    pub async fn handle(&self, command: &Command, validation: &ValidationResult) -> CommandOutcome {
        self.planner.execute(command, validation, true).await
    }
}
