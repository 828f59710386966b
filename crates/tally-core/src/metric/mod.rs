//! The metric facade.
//!
//! Application code records through a [`MetricInstance`]; terminal sinks and
//! decorators implement it. Identifiers are plain strings whose segments are
//! separated by [`DELIMITER`], most general first
//! (`connectionsAccepted:127.0.0.1:1234`).

mod level;
mod unit;

use std::sync::Arc;

pub use level::{GroupLevelProvider, LevelParseError, LevelTable, NoLevels};
pub use unit::TimeUnit;

/// Separator between identifier segments.
pub const DELIMITER: char = ':';

/// A value computed on every read.
///
/// Gauges must be cheap and free of side effects: they are invoked by
/// whoever reads the sink, from any thread, as often as it likes.
pub trait MetricGauge: Send + Sync {
    fn value(&self) -> i64;
}

impl<F> MetricGauge for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn value(&self) -> i64 {
        self()
    }
}

/// Receiver of counters, series, durations, point values and gauges.
///
/// None of the operations can fail; a sink creates storage for any
/// identifier it has not seen before.
pub trait MetricInstance: Send + Sync {
    /// Records a duration that was measured by the caller.
    fn duration(&self, id: &str, amount: u64, unit: TimeUnit);

    /// Starts a timer that reports to this instance when stopped.
    fn start(&self, id: &str) -> Box<dyn MetricTimer + '_>;

    /// Adds `amount` (which may be negative) to a running counter.
    fn increment(&self, id: &str, amount: i64);

    /// Records one sample of a series.
    fn log(&self, id: &str, value: i64);

    /// Overwrites the single current value of `id`.
    fn set(&self, id: &str, value: i64);

    /// Registers a gauge evaluated whenever `id` is read.
    ///
    /// Shares its namespace with [`set`](MetricInstance::set).
    fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>);
}

/// Handle for a running time measurement.
pub trait MetricTimer {
    /// Stops the timer and returns the elapsed time in [`time_unit`](MetricTimer::time_unit).
    ///
    /// The first call reports the elapsed time to the owning instance.
    /// Later calls return the same value without reporting again.
    fn stop(&mut self) -> u64;

    /// The instance this timer reports to.
    fn metrics(&self) -> &dyn MetricInstance;

    fn time_unit(&self) -> TimeUnit;
}

/// Hands out named metric instances.
pub trait MetricProvider: Send + Sync {
    fn metric_instance(&self, name: &str) -> Arc<dyn MetricInstance>;
}

impl<T: MetricInstance + ?Sized> MetricInstance for Arc<T> {
    fn duration(&self, id: &str, amount: u64, unit: TimeUnit) {
        (**self).duration(id, amount, unit)
    }

    fn start(&self, id: &str) -> Box<dyn MetricTimer + '_> {
        (**self).start(id)
    }

    fn increment(&self, id: &str, amount: i64) {
        (**self).increment(id, amount)
    }

    fn log(&self, id: &str, value: i64) {
        (**self).log(id, value)
    }

    fn set(&self, id: &str, value: i64) {
        (**self).set(id, value)
    }

    fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>) {
        (**self).set_gauge(id, gauge)
    }
}

impl<T: MetricInstance + ?Sized> MetricInstance for &T {
    fn duration(&self, id: &str, amount: u64, unit: TimeUnit) {
        (**self).duration(id, amount, unit)
    }

    fn start(&self, id: &str) -> Box<dyn MetricTimer + '_> {
        (**self).start(id)
    }

    fn increment(&self, id: &str, amount: i64) {
        (**self).increment(id, amount)
    }

    fn log(&self, id: &str, value: i64) {
        (**self).log(id, value)
    }

    fn set(&self, id: &str, value: i64) {
        (**self).set(id, value)
    }

    fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>) {
        (**self).set_gauge(id, gauge)
    }
}
