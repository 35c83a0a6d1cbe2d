use std::sync::Arc;

use crate::command::{Command, CommandOutcome};
use crate::intent::ValidationResult;
use crate::planner::HybridPlanner;

/// GUI interactions go straight to the hybrid planner.
pub struct GuiHandler {
    planner: Arc<HybridPlanner>,
}

impl GuiHandler {
    pub fn new(planner: Arc<HybridPlanner>) -> Self {
        Self { planner }
    }

    pub async fn handle(&self, command: &Command, validation: &ValidationResult) -> CommandOutcome {
        self.planner.execute(command, validation, false).await
    }
}
