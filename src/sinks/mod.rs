//! Listener sinks and fan-out

pub mod registry;

pub use registry::{ListenerStream, SinkId, SinkInfo, SinkRegistry};
