//! Mock filesystem and canned host scenarios for collector tests.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
