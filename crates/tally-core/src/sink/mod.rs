//! In-memory terminal sinks.

mod memory;
mod registry;
mod summary;

pub use memory::{MemorySink, SinkConfig, Snapshot};
pub use registry::MemoryRegistry;
pub use summary::SeriesSummary;
