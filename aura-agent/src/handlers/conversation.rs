use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::command::{Command, CommandOutcome};
use crate::traits::{Feedback, Reasoning, ResponseFormat, SpeakPriority};

const CONVERSATION_PROMPT: &str = "You are a concise desktop voice assistant. \
Answer the user in a couple of spoken sentences.";

/// Conversational chat: a bounded in-memory exchange ring threads recent
/// turns into each prompt. Nothing is persisted.
pub struct ConversationHandler {
    reasoning: Arc<dyn Reasoning>,
    feedback: Arc<dyn Feedback>,
    context: Mutex<VecDeque<(String, String)>>,
    context_size: usize,
}

impl ConversationHandler {
    pub fn new(
        reasoning: Arc<dyn Reasoning>,
        feedback: Arc<dyn Feedback>,
        context_size: usize,
    ) -> Self {
        Self {
            reasoning,
            feedback,
            context: Mutex::new(VecDeque::with_capacity(context_size)),
            context_size: context_size.max(1),
        }
    }

    pub async fn handle(&self, command: &Command) -> CommandOutcome {
        let prompt = self.build_prompt(&command.raw_text);

        let reply = match self
            .reasoning
            .generate(&prompt, 500, ResponseFormat::Text)
            .await
        {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "conversation generation failed");
                self.feedback
                    .speak("Sorry, I couldn't come up with an answer.", SpeakPriority::Normal)
                    .await;
                return CommandOutcome::failed(
                    command.execution_id,
                    format!("conversation failed: {e}"),
                );
            }
        };

        self.push_exchange(&command.raw_text, &reply);
        self.feedback.speak(&reply, SpeakPriority::Normal).await;
        CommandOutcome::completed(command.execution_id)
    }

    fn build_prompt(&self, user_text: &str) -> String {
        let mut prompt = String::from(CONVERSATION_PROMPT);
        let context = self.context.lock();
        if !context.is_empty() {
            prompt.push_str("\n\nRecent exchanges:");
            for (user, assistant) in context.iter() {
                prompt.push_str(&format!("\nUser: {user}\nAssistant: {assistant}"));
            }
        }
        prompt.push_str(&format!("\n\nUser: {user_text}\nAssistant:"));
        prompt
    }

    fn push_exchange(&self, user: &str, assistant: &str) {
        let mut context = self.context.lock();
        if context.len() == self.context_size {
            context.pop_front();
        }
        context.push_back((user.to_string(), assistant.to_string()));
    }

    #[cfg(test)]
    fn context_len(&self) -> usize {
        self.context.lock().len()
    }
}
