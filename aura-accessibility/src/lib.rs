//! Accessibility fast-path engine.
//!
//! Wraps the native accessibility tree behind a platform-independent
//! snapshot model so the search engine, target extraction, and caching
//! layers run (and test) anywhere. The macOS provider talks to the AX API
//! through objc2-application-services; everything else consumes
//! [`UiSnapshot`] data.

mod element;
mod engine;
mod permissions;
mod provider;
mod search;
mod snapshot;
mod target;

#[cfg(target_os = "macos")]
mod macos;

pub use element::{NodeId, UiBounds, UiNode};
pub use engine::{AccessibilityEngine, EngineError};
pub use permissions::{guidance_steps, PermissionLevel, PermissionState};
pub use provider::{AppConnection, ProviderError, TreeProvider};
pub use search::{find_in_snapshot, ElementMatch, SearchMiss};
pub use snapshot::{SnapshotBuilder, UiSnapshot};
pub use target::{ExtractedTarget, TargetExtractor};

#[cfg(target_os = "macos")]
pub use macos::MacTreeProvider;
