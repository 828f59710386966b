//! tally-core: a small metrics facade.
//!
//! - `metric`: the [`MetricInstance`](metric::MetricInstance) family of traits
//! - `grouper`: fans hierarchical identifiers out to their group levels
//! - `timer`: stopwatch timer used by terminal sinks
//! - `sink`: in-memory sinks, registry and series summaries
//! - `collector`: `/proc` and mount readings behind a mockable filesystem
//! - `system`: runtime, memory and file store gauges

pub mod collector;
pub mod grouper;
pub mod metric;
pub mod sink;
pub mod system;
pub mod timer;
