//! Thin per-intent adapters. Each handler turns one recognized intent
//! into collaborator calls and a tagged outcome; none of them touch the
//! orchestrator's locks.

mod conversation;
mod deferred;
mod gui;
mod question;

pub use conversation::ConversationHandler;
pub use deferred::DeferredHandler;
pub use gui::GuiHandler;
pub use question::QuestionHandler;
