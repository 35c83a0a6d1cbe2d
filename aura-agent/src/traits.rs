//! Capability seams for the external collaborators: the reasoning LLM,
//! the vision model, audio in/out, and the feedback channel. The core
//! never branches on which model or engine sits behind a trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque captured-screen handle passed from capture to analysis.
#[derive(Debug, Clone)]
pub struct ImageHandle(pub Vec<u8>);

/// What the vision model saw on screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenContext {
    #[serde(default)]
    pub elements: Vec<ScreenElement>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenElement {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    /// `[x1, y1, x2, y2]`
    pub coordinates: [f64; 4],
    #[serde(default)]
    pub description: String,
}

/// One step of a reasoning-produced plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: PlanAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Click,
    DoubleClick,
    Type,
    Scroll,
    Speak,
    Finish,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanMetadata {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub estimated_duration: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub plan: Vec<PlanStep>,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// Remote reasoning model.
#[async_trait]
pub trait Reasoning: Send + Sync {
    /// Produce an executable plan for a command given what is on screen.
    async fn get_action_plan(
        &self,
        command: &str,
        screen_context: &ScreenContext,
    ) -> anyhow::Result<ActionPlan>;

    /// Free-form generation. Intent and explanation calls keep responses
    /// under 2000 characters.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        response_format: ResponseFormat,
    ) -> anyhow::Result<String>;
}

/// Screen perception: capture plus model-driven analysis.
#[async_trait]
pub trait Vision: Send + Sync {
    async fn capture_screen(&self) -> anyhow::Result<ImageHandle>;
    async fn analyze(&self, image: &ImageHandle, prompt: &str) -> anyhow::Result<ScreenContext>;
}

/// Speech in and out. `recognize` blocks until an utterance or timeout.
#[async_trait]
pub trait Audio: Send + Sync {
    async fn recognize(&self) -> anyhow::Result<String>;
    async fn speak(&self, text: &str, priority: SpeakPriority);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Success,
    Failure,
    Thinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakPriority {
    Low,
    Normal,
    High,
}

/// Audio cues and short spoken confirmations. Failures are logged inside
/// implementations; feedback never fails a command.
#[async_trait]
pub trait Feedback: Send + Sync {
    async fn play(&self, cue: SoundCue);
    async fn speak(&self, message: &str, priority: SpeakPriority);
}
