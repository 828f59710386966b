//! Time units used by durations and timers.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Unit in which a duration sample or a timer result is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of nanoseconds in one unit.
    pub const fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 60 * 60 * 1_000_000_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000_000_000,
        }
    }

    /// Converts `amount` expressed in `source` into this unit.
    ///
    /// Conversions to a coarser unit truncate, conversions to a finer unit
    /// saturate at `u64::MAX`.
    pub fn convert(self, amount: u64, source: TimeUnit) -> u64 {
        let (from, to) = (source.nanos(), self.nanos());
        if from >= to {
            amount.saturating_mul(from / to)
        } else {
            amount / (to / from)
        }
    }

    /// Expresses a [`Duration`] as a whole number of this unit (truncating).
    pub fn convert_duration(self, duration: Duration) -> u64 {
        let units = duration.as_nanos() / u128::from(self.nanos());
        u64::try_from(units).unwrap_or(u64::MAX)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
