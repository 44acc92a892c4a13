//! Signals and the ports that receive their values.

pub(crate) mod channel;
pub(crate) mod port;
pub(crate) mod queue;
pub(crate) mod sample;

pub use channel::Signal;
pub use port::{FilterHandle, ListenerHandle};
pub use queue::QueuePort;
pub use sample::SamplePort;
