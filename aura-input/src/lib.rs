//! Input synthesis and global mouse listening.
//!
//! [`Automation`] wraps the device behind an async seam with a per-line
//! typing transport; [`MouseListener`] wraps one long-lived OS hook
//! thread with an arm/disarm token, since the hook itself cannot be torn
//! down once installed. The enigo and rdev backends are macOS-only, per
//! the project's input scope; every consumer talks to the traits.

mod automation;
mod listener;

pub use automation::{
    drive_typing, Automation, AutomationError, LineSink, ScrollDirection, TypingBudget,
};
pub use listener::{ClickCallback, ListenerError, MouseListener};

#[cfg(target_os = "macos")]
pub use automation::EnigoAutomation;
#[cfg(target_os = "macos")]
pub use listener::RdevListener;
