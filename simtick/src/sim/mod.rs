//! Kernel core: virtual clock, event queue, identifiers and shared state.

pub(crate) mod clock;
pub(crate) mod config;
pub(crate) mod events;
pub(crate) mod ids;
pub(crate) mod kernel;

pub use clock::LogicalClock;
pub use config::ContextConfig;
pub use events::{Event, EventKey, EventQueue, ScheduledEvent};
pub use ids::{InvariantId, RunnerId, SourceId, TimerId};
pub use kernel::RunnerState;
