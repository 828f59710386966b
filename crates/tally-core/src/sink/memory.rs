//! A terminal [`MetricInstance`] keeping everything in process memory.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::metric::{MetricGauge, MetricInstance, MetricTimer, TimeUnit};
use crate::sink::SeriesSummary;
use crate::timer::StopwatchTimer;

/// Tuning for [`MemorySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Samples retained per series (and per duration id).
    pub series_capacity: usize,
}

impl SinkConfig {
    pub const DEFAULT_SERIES_CAPACITY: usize = 1024;

    pub fn new(series_capacity: usize) -> Self {
        Self {
            series_capacity: series_capacity.max(1),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SERIES_CAPACITY)
    }
}

/// Point-in-time contents of a [`MemorySink`], with gauges evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub counters: BTreeMap<String, i64>,
    pub values: BTreeMap<String, i64>,
    pub series: BTreeMap<String, SeriesSummary>,
    /// Duration samples, in nanoseconds.
    pub durations: BTreeMap<String, SeriesSummary>,
}

/// Current value of an id: a stored number or a gauge read on demand.
#[derive(Clone)]
enum Current {
    Value(i64),
    Gauge(Arc<dyn MetricGauge>),
}

impl Current {
    fn read(&self) -> i64 {
        match self {
            Current::Value(value) => *value,
            Current::Gauge(gauge) => gauge.value(),
        }
    }
}

#[derive(Default)]
struct Series {
    samples: VecDeque<i64>,
    count: u64,
}

impl Series {
    fn push(&mut self, value: i64, capacity: usize) {
        if self.samples.len() == capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.count += 1;
    }

    fn summary(&self) -> SeriesSummary {
        SeriesSummary::from_samples(self.count, &self.samples)
    }
}

/// In-memory sink.
///
/// Counters, series and durations live in separate maps; `set` and
/// `set_gauge` share one map of current values. Durations are normalized
/// to nanoseconds. Every map recovers from lock poisoning, so a panic in one
/// caller never disables metrics for the others.
#[derive(Default)]
pub struct MemorySink {
    config: SinkConfig,
    counters: RwLock<BTreeMap<String, i64>>,
    series: RwLock<BTreeMap<String, Series>>,
    durations: RwLock<BTreeMap<String, Series>>,
    current: RwLock<BTreeMap<String, Current>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> SinkConfig {
        self.config
    }

    /// Returns the counter for `id`, if it was ever incremented.
    pub fn counter(&self, id: &str) -> Option<i64> {
        read(&self.counters).get(id).copied()
    }

    /// Returns the current value of `id`, evaluating a gauge if one is
    /// registered.
    pub fn value(&self, id: &str) -> Option<i64> {
        let current = read(&self.current).get(id)?.clone();
        Some(current.read())
    }

    pub fn series(&self, id: &str) -> Option<SeriesSummary> {
        read(&self.series).get(id).map(Series::summary)
    }

    /// Duration summary for `id`, in nanoseconds.
    pub fn durations(&self, id: &str) -> Option<SeriesSummary> {
        read(&self.durations).get(id).map(Series::summary)
    }

    /// Captures every metric, reading gauges now.
    pub fn snapshot(&self) -> Snapshot {
        let counters = read(&self.counters).clone();
        let series = summarize(&read(&self.series));
        let durations = summarize(&read(&self.durations));

        // Gauges are evaluated after the lock is released.
        let current: Vec<(String, Current)> = read(&self.current)
            .iter()
            .map(|(id, current)| (id.clone(), current.clone()))
            .collect();
        let values = current
            .into_iter()
            .map(|(id, current)| (id, current.read()))
            .collect();

        Snapshot {
            counters,
            values,
            series,
            durations,
        }
    }

    fn push_sample(&self, map: &RwLock<BTreeMap<String, Series>>, id: &str, value: i64) {
        let mut map = write(map);
        match map.get_mut(id) {
            Some(series) => series.push(value, self.config.series_capacity),
            None => {
                let mut series = Series::default();
                series.push(value, self.config.series_capacity);
                map.insert(id.to_string(), series);
            }
        }
    }

    fn set_current(&self, id: &str, current: Current) {
        write(&self.current).insert(id.to_string(), current);
    }
}

fn summarize(map: &BTreeMap<String, Series>) -> BTreeMap<String, SeriesSummary> {
    map.iter()
        .map(|(id, series)| (id.clone(), series.summary()))
        .collect()
}

impl MetricInstance for MemorySink {
    fn duration(&self, id: &str, amount: u64, unit: TimeUnit) {
        let nanos = TimeUnit::Nanoseconds.convert(amount, unit);
        let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
        self.push_sample(&self.durations, id, nanos);
    }

    fn start(&self, id: &str) -> Box<dyn MetricTimer + '_> {
        Box::new(StopwatchTimer::start(self, id))
    }

    fn increment(&self, id: &str, amount: i64) {
        let mut counters = write(&self.counters);
        match counters.get_mut(id) {
            Some(counter) => *counter = counter.saturating_add(amount),
            None => {
                counters.insert(id.to_string(), amount);
            }
        }
    }

    fn log(&self, id: &str, value: i64) {
        self.push_sample(&self.series, id, value);
    }

    fn set(&self, id: &str, value: i64) {
        self.set_current(id, Current::Value(value));
    }

    fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>) {
        self.set_current(id, Current::Gauge(gauge));
    }
}
