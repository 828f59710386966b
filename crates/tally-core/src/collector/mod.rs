//! Host and process readings for Linux.
//!
//! Everything goes through the [`FileSystem`] trait so the same code runs
//! against the real `/proc` and against [`MockFs`] scenarios on any host.
//!
//! ```text
//!        ┌──────────────────────┐
//!        │   SystemCollector    │  /proc/meminfo, /proc/loadavg,
//!        │                      │  /proc/self/*, mount table, statvfs
//!        └──────────┬───────────┘
//!                   │
//!            ┌──────▼──────┐
//!            │  FileSystem │ (trait)
//!            └──────┬──────┘
//!         ┌─────────┴─────────┐
//!   ┌─────▼─────┐       ┌─────▼─────┐
//!   │  RealFs   │       │  MockFs   │
//!   │  (Linux)  │       │ (Testing) │
//!   └───────────┘       └───────────┘
//! ```
//!
//! ```
//! use tally_core::collector::{MockFs, SystemCollector};
//!
//! let collector = SystemCollector::new(MockFs::typical_system(), "/proc");
//! assert_eq!(collector.collect_self_status().unwrap().threads, 12);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{CollectError, ParseError, SystemCollector};
pub use traits::{FileSystem, RealFs, SpaceInfo};
