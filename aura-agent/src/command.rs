use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One command attempt, created when the orchestrator accepts the text
/// and dropped when the attempt returns.
#[derive(Debug, Clone)]
pub struct Command {
    pub raw_text: String,
    pub normalized_text: String,
    pub execution_id: Uuid,
    pub received_at: DateTime<Utc>,
}

impl Command {
    pub fn new(raw_text: &str, normalized_text: String) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            normalized_text,
            execution_id: Uuid::new_v4(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Completed,
    Failed,
    WaitingForUserAction,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathUsed {
    Fast,
    Slow,
}

/// Tagged result of one `execute_command` call.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub execution_id: Uuid,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_used: Option<PathUsed>,
}

impl CommandOutcome {
    pub fn completed(execution_id: Uuid) -> Self {
        Self {
            status: CommandStatus::Completed,
            execution_id,
            duration_ms: 0,
            errors: Vec::new(),
            path_used: None,
        }
    }

    pub fn failed(execution_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failed,
            execution_id,
            duration_ms: 0,
            errors: vec![reason.into()],
            path_used: None,
        }
    }

    pub fn waiting(execution_id: Uuid) -> Self {
        Self {
            status: CommandStatus::WaitingForUserAction,
            execution_id,
            duration_ms: 0,
            errors: Vec::new(),
            path_used: None,
        }
    }

    pub fn with_path(mut self, path: PathUsed) -> Self {
        self.path_used = Some(path);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            CommandStatus::Completed | CommandStatus::WaitingForUserAction
        )
    }

    /// Process-level status mapping for embedders.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Completed => 0,
            CommandStatus::Failed => 1,
            CommandStatus::Interrupted => 2,
            CommandStatus::WaitingForUserAction => 3,
        }
    }
}
