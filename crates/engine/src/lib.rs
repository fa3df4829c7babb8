//! Execution core for a live rundown: which item is live, which is next,
//! what is armed and which overlays are on air.

pub mod automation;
pub mod controller;
pub mod engine;
pub mod gate;
pub mod overlays;
pub mod rundown;
pub mod timers;

pub use automation::{AutomationScheduler, CountdownPhase};
pub use controller::Controller;
pub use engine::{Engine, SceneCommand};
pub use gate::{ActionGate, ActionRejected, DEFAULT_STALENESS_WINDOW_MS};
pub use overlays::{OverlayChange, OverlayScheduler, OverlayTimer};
pub use rundown::{is_actionable, IndexedItem, RundownIndex};
pub use timers::TimerRegistry;

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;
