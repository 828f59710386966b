//! Wall-clock timer handed out by terminal sinks.

use std::time::Instant;

use crate::metric::{MetricInstance, MetricTimer, TimeUnit};

/// Measures elapsed time from creation until [`stop`](MetricTimer::stop),
/// then reports it to its owner through [`MetricInstance::duration`].
pub struct StopwatchTimer<'a> {
    owner: &'a dyn MetricInstance,
    id: String,
    unit: TimeUnit,
    started: Instant,
    elapsed: Option<u64>,
}

impl<'a> StopwatchTimer<'a> {
    /// Starts a millisecond timer for `id`.
    pub fn start(owner: &'a dyn MetricInstance, id: impl Into<String>) -> Self {
        Self {
            owner,
            id: id.into(),
            unit: TimeUnit::Milliseconds,
            started: Instant::now(),
            elapsed: None,
        }
    }

    pub fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl MetricTimer for StopwatchTimer<'_> {
    fn stop(&mut self) -> u64 {
        if let Some(elapsed) = self.elapsed {
            return elapsed;
        }
        let elapsed = self.unit.convert_duration(self.started.elapsed());
        self.elapsed = Some(elapsed);
        self.owner.duration(&self.id, elapsed, self.unit);
        elapsed
    }

    fn metrics(&self) -> &dyn MetricInstance {
        self.owner
    }

    fn time_unit(&self) -> TimeUnit {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stop_reports_duration_once() {
        let sink = MemorySink::default();
        let mut timer = StopwatchTimer::start(&sink, "query").with_unit(TimeUnit::Microseconds);
        thread::sleep(Duration::from_millis(2));

        let first = timer.stop();
        let second = timer.stop();

        assert!(first >= 2_000);
        assert_eq!(first, second);

        let durations = sink.durations("query").unwrap();
        assert_eq!(durations.count, 1);
    }

    #[test]
    fn test_metrics_returns_owner() {
        let sink = MemorySink::default();
        let timer = StopwatchTimer::start(&sink, "query");
        assert_eq!(timer.id(), "query");
        assert_eq!(timer.time_unit(), TimeUnit::Milliseconds);

        let owner = timer.metrics() as *const dyn MetricInstance as *const u8;
        let sink_ptr = &sink as *const MemorySink as *const u8;
        assert_eq!(owner, sink_ptr);
    }
}
