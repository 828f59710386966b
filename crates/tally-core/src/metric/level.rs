//! Group level providers for [`MetricGrouper`](crate::grouper::MetricGrouper).
//!
//! A provider maps the top segment of an identifier to a level. `Some(0)`
//! suppresses the identifier entirely; any other answer, including `None`,
//! keeps at least the top-level aggregate.

use std::collections::HashMap;

/// Supplies the group level for a top-level identifier segment.
pub trait GroupLevelProvider: Send + Sync {
    fn level(&self, segment: &str) -> Option<i32>;
}

impl<F> GroupLevelProvider for F
where
    F: Fn(&str) -> Option<i32> + Send + Sync,
{
    fn level(&self, segment: &str) -> Option<i32> {
        self(segment)
    }
}

/// Provider without an opinion on any segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLevels;

impl GroupLevelProvider for NoLevels {
    fn level(&self, _segment: &str) -> Option<i32> {
        None
    }
}

/// Error for a malformed `segment=level` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelParseError {
    pub message: String,
}

impl LevelParseError {
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid group level: {}", self.message)
    }
}

impl std::error::Error for LevelParseError {}

/// Fixed table of segment levels, usually built from configuration.
#[derive(Debug, Default, Clone)]
pub struct LevelTable {
    levels: HashMap<String, i32>,
}

impl LevelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level for a segment, replacing any previous entry.
    pub fn insert(&mut self, segment: impl Into<String>, level: i32) {
        self.levels.insert(segment.into(), level);
    }

    pub fn with(mut self, segment: impl Into<String>, level: i32) -> Self {
        self.insert(segment, level);
        self
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Parses a `segment=level` entry.
    ///
    /// The segment must be non-empty and must not contain the identifier
    /// delimiter, since only top-level segments are ever looked up.
    pub fn parse_entry(entry: &str) -> Result<(String, i32), LevelParseError> {
        let (segment, level) = entry
            .split_once('=')
            .ok_or_else(|| LevelParseError::new(format!("expected segment=level, got '{entry}'")))?;

        let segment = segment.trim();
        if segment.is_empty() {
            return Err(LevelParseError::new("empty segment"));
        }
        if segment.contains(crate::metric::DELIMITER) {
            return Err(LevelParseError::new(format!(
                "segment '{segment}' contains the delimiter"
            )));
        }

        let level = level
            .trim()
            .parse::<i32>()
            .map_err(|e| LevelParseError::new(format!("level for '{segment}': {e}")))?;

        Ok((segment.to_string(), level))
    }
}

impl FromIterator<(String, i32)> for LevelTable {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

impl GroupLevelProvider for LevelTable {
    fn level(&self, segment: &str) -> Option<i32> {
        self.levels.get(segment).copied()
    }
}
