//! Collectors for Linux `/proc` filesystem.
//!
//! This module provides parsers and a collector for reading host and
//! process information from the `/proc` virtual filesystem.

mod error;
pub mod parser;
pub mod system;

pub use error::CollectError;
pub use parser::ParseError;
pub use system::SystemCollector;
