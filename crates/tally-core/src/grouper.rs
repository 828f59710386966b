//! Hierarchical fan-out of metric identifiers.
//!
//! A server may increment `connectionsAccepted:127.0.0.1:1234`. With the
//! default depth of 1 the grouper forwards this as `connectionsAccepted`,
//! giving an aggregate of all accepted connections. With a depth of 2 it
//! additionally forwards `connectionsAccepted:127.0.0.1`, a per-client view,
//! from the same call site.
//!
//! Point-in-time values (`set`, `set_gauge`) are never split.

use std::sync::Arc;

use crate::metric::{
    DELIMITER, GroupLevelProvider, MetricGauge, MetricInstance, MetricTimer, TimeUnit,
};

/// Decorator forwarding each call once per approved identifier prefix.
pub struct MetricGrouper<P, L> {
    parent: P,
    provider: L,
    max_depth: usize,
}

impl<P: MetricInstance, L: GroupLevelProvider> MetricGrouper<P, L> {
    pub const DEFAULT_MAX_DEPTH: usize = 1;

    pub fn new(parent: P, provider: L) -> Self {
        Self {
            parent,
            provider,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets how many prefix levels are emitted per call (at least 1).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn parent(&self) -> &P {
        &self.parent
    }

    pub fn provider(&self) -> &L {
        &self.provider
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Computes the identifiers a call on `id` is forwarded to, most general
    /// first.
    ///
    /// The provider is consulted for the top segment only; a level of 0
    /// drops the identifier altogether.
    pub fn split<'a>(&self, id: &'a str) -> Vec<&'a str> {
        let mut parts = Vec::with_capacity(self.max_depth);
        let mut from = 0;

        while parts.len() < self.max_depth {
            let end = id[from..].find(DELIMITER).map(|i| from + i);
            let part = match end {
                Some(end) => &id[..end],
                None => id,
            };

            if parts.is_empty() && self.provider.level(part) == Some(0) {
                break;
            }
            parts.push(part);

            match end {
                Some(end) => from = end + DELIMITER.len_utf8(),
                None => break,
            }
        }

        parts
    }
}

impl<P: MetricInstance, L: GroupLevelProvider> MetricInstance for MetricGrouper<P, L> {
    fn duration(&self, id: &str, amount: u64, unit: TimeUnit) {
        for part in self.split(id) {
            self.parent.duration(part, amount, unit);
        }
    }

    fn start(&self, id: &str) -> Box<dyn MetricTimer + '_> {
        let timers = self
            .split(id)
            .into_iter()
            .map(|part| self.parent.start(part))
            .collect();
        Box::new(CombinedTimer::new(self, timers))
    }

    fn increment(&self, id: &str, amount: i64) {
        for part in self.split(id) {
            self.parent.increment(part, amount);
        }
    }

    fn log(&self, id: &str, value: i64) {
        for part in self.split(id) {
            self.parent.log(part, value);
        }
    }

    fn set(&self, id: &str, value: i64) {
        self.parent.set(id, value);
    }

    fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>) {
        self.parent.set_gauge(id, gauge);
    }
}

/// Timer over the component timers started by one grouped call.
pub struct CombinedTimer<'a> {
    owner: &'a dyn MetricInstance,
    timers: Vec<Box<dyn MetricTimer + 'a>>,
    stopped: Option<u64>,
}

impl<'a> CombinedTimer<'a> {
    pub fn new(owner: &'a dyn MetricInstance, timers: Vec<Box<dyn MetricTimer + 'a>>) -> Self {
        Self {
            owner,
            timers,
            stopped: None,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl MetricTimer for CombinedTimer<'_> {
    /// Stops every component in order and returns the value of the last one.
    ///
    /// Components are stopped only on the first call; later calls return the
    /// same value.
    fn stop(&mut self) -> u64 {
        if let Some(value) = self.stopped {
            return value;
        }
        let mut value = 0;
        for timer in &mut self.timers {
            value = timer.stop();
        }
        self.stopped = Some(value);
        value
    }

    fn metrics(&self) -> &dyn MetricInstance {
        self.owner
    }

    fn time_unit(&self) -> TimeUnit {
        self.timers
            .first()
            .map(|timer| timer.time_unit())
            .unwrap_or(TimeUnit::Milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{LevelTable, NoLevels};
    use crate::sink::MemorySink;
    use std::sync::Mutex;

    /// Records every forwarded call as `op(id)`.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MetricInstance for RecordingSink {
        fn duration(&self, id: &str, amount: u64, unit: TimeUnit) {
            self.push(format!("duration({id},{amount},{unit})"));
        }

        fn start(&self, id: &str) -> Box<dyn MetricTimer + '_> {
            self.push(format!("start({id})"));
            Box::new(FixedTimer::new(self, 7, TimeUnit::Seconds))
        }

        fn increment(&self, id: &str, amount: i64) {
            self.push(format!("increment({id},{amount})"));
        }

        fn log(&self, id: &str, value: i64) {
            self.push(format!("log({id},{value})"));
        }

        fn set(&self, id: &str, value: i64) {
            self.push(format!("set({id},{value})"));
        }

        fn set_gauge(&self, id: &str, gauge: Arc<dyn MetricGauge>) {
            self.push(format!("set_gauge({id},{})", gauge.value()));
        }
    }

    /// Timer returning a fixed value; records stops on a shared log.
    struct FixedTimer<'a> {
        owner: &'a dyn MetricInstance,
        value: u64,
        unit: TimeUnit,
        stops: Option<&'a Mutex<Vec<u64>>>,
    }

    impl<'a> FixedTimer<'a> {
        fn new(owner: &'a dyn MetricInstance, value: u64, unit: TimeUnit) -> Self {
            Self {
                owner,
                value,
                unit,
                stops: None,
            }
        }

        fn logging(mut self, stops: &'a Mutex<Vec<u64>>) -> Self {
            self.stops = Some(stops);
            self
        }
    }

    impl MetricTimer for FixedTimer<'_> {
        fn stop(&mut self) -> u64 {
            if let Some(stops) = self.stops {
                stops.lock().unwrap().push(self.value);
            }
            self.value
        }

        fn metrics(&self) -> &dyn MetricInstance {
            self.owner
        }

        fn time_unit(&self) -> TimeUnit {
            self.unit
        }
    }

    fn suppress(segment: &'static str) -> impl GroupLevelProvider {
        move |s: &str| (s == segment).then_some(0_i32)
    }

    #[test]
    fn test_split_without_delimiter() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels);
        assert_eq!(grouper.split("requests"), vec!["requests"]);
    }

    #[test]
    fn test_split_without_delimiter_suppressed() {
        let grouper = MetricGrouper::new(RecordingSink::default(), suppress("requests"));
        assert!(grouper.split("requests").is_empty());
    }

    #[test]
    fn test_split_takes_top_segment() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels);
        assert_eq!(grouper.split("conn:127.0.0.1:1234"), vec!["conn"]);
    }

    #[test]
    fn test_split_suppressed_top_segment() {
        let grouper = MetricGrouper::new(RecordingSink::default(), suppress("A"));
        assert!(grouper.split("A:B:C").is_empty());
        assert_eq!(grouper.split("B:A:C"), vec!["B"]);
    }

    #[test]
    fn test_split_nonzero_level_keeps_aggregate() {
        let levels = LevelTable::new().with("A", 3).with("B", -1);
        let grouper = MetricGrouper::new(RecordingSink::default(), levels);
        assert_eq!(grouper.split("A:x"), vec!["A"]);
        assert_eq!(grouper.split("B:x"), vec!["B"]);
    }

    #[test]
    fn test_split_deeper() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels).with_max_depth(2);
        assert_eq!(
            grouper.split("conn:127.0.0.1:1234"),
            vec!["conn", "conn:127.0.0.1"]
        );

        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels).with_max_depth(5);
        assert_eq!(
            grouper.split("conn:127.0.0.1:1234"),
            vec!["conn", "conn:127.0.0.1", "conn:127.0.0.1:1234"]
        );
        // The whole identifier is emitted once, however deep the grouper goes.
        assert_eq!(grouper.split("conn"), vec!["conn"]);
    }

    #[test]
    fn test_split_depth_is_at_least_one() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels).with_max_depth(0);
        assert_eq!(grouper.max_depth(), 1);
        assert_eq!(grouper.split("a:b"), vec!["a"]);
    }

    #[test]
    fn test_split_leading_delimiter() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels);
        assert_eq!(grouper.split(":tail"), vec![""]);
    }

    #[test]
    fn test_forwarding_uses_split_identifier() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels);
        grouper.increment("conn:127.0.0.1:1234", 5);
        grouper.log("latency:db", 12);
        grouper.duration("query:users", 30, TimeUnit::Milliseconds);

        assert_eq!(
            grouper.parent().calls(),
            vec![
                "increment(conn,5)",
                "log(latency,12)",
                "duration(query,30,milliseconds)",
            ]
        );
    }

    #[test]
    fn test_suppressed_identifier_forwards_nothing() {
        let grouper = MetricGrouper::new(RecordingSink::default(), suppress("A"));
        grouper.increment("A:B:C", 5);
        grouper.log("A:B", 1);
        grouper.duration("A", 1, TimeUnit::Seconds);
        let mut timer = grouper.start("A:B");

        assert_eq!(timer.stop(), 0);
        assert!(grouper.parent().calls().is_empty());
    }

    #[test]
    fn test_set_is_never_split() {
        let grouper = MetricGrouper::new(RecordingSink::default(), suppress("A"));
        grouper.set("A:B:C", 4);
        grouper.set_gauge("A:B:C", Arc::new(|| 9));

        assert_eq!(
            grouper.parent().calls(),
            vec!["set(A:B:C,4)", "set_gauge(A:B:C,9)"]
        );
    }

    #[test]
    fn test_start_fans_out_per_level() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels).with_max_depth(2);
        let mut timer = grouper.start("conn:10.0.0.1:80");

        assert_eq!(
            grouper.parent().calls(),
            vec!["start(conn)", "start(conn:10.0.0.1)"]
        );
        assert_eq!(timer.time_unit(), TimeUnit::Seconds);
        assert_eq!(timer.stop(), 7);
    }

    #[test]
    fn test_combined_timer_returns_last_stopped() {
        let owner = RecordingSink::default();
        let stops = Mutex::new(Vec::new());
        let timers: Vec<Box<dyn MetricTimer + '_>> = vec![
            Box::new(FixedTimer::new(&owner, 10, TimeUnit::Milliseconds).logging(&stops)),
            Box::new(FixedTimer::new(&owner, 25, TimeUnit::Milliseconds).logging(&stops)),
        ];
        let mut combined = CombinedTimer::new(&owner, timers);

        assert_eq!(combined.len(), 2);
        assert_eq!(combined.stop(), 25);
        assert_eq!(*stops.lock().unwrap(), vec![10, 25]);
    }

    #[test]
    fn test_combined_timer_stops_components_once() {
        let owner = RecordingSink::default();
        let stops = Mutex::new(Vec::new());
        let timers: Vec<Box<dyn MetricTimer + '_>> = vec![
            Box::new(FixedTimer::new(&owner, 10, TimeUnit::Milliseconds).logging(&stops)),
            Box::new(FixedTimer::new(&owner, 25, TimeUnit::Milliseconds).logging(&stops)),
        ];
        let mut combined = CombinedTimer::new(&owner, timers);

        assert_eq!(combined.stop(), 25);
        assert_eq!(combined.stop(), 25);
        assert_eq!(*stops.lock().unwrap(), vec![10, 25]);
    }

    #[test]
    fn test_empty_combined_timer_is_milliseconds() {
        let owner = RecordingSink::default();
        let combined = CombinedTimer::new(&owner, Vec::new());
        assert!(combined.is_empty());
        assert_eq!(combined.time_unit(), TimeUnit::Milliseconds);
    }

    #[test]
    fn test_combined_timer_metrics_is_grouper() {
        let grouper = MetricGrouper::new(RecordingSink::default(), NoLevels);
        let timer = grouper.start("a:b");

        let owner = timer.metrics() as *const dyn MetricInstance as *const u8;
        let grouper_ptr = &grouper as *const _ as *const u8;
        assert_eq!(owner, grouper_ptr);
    }

    #[test]
    fn test_grouped_timer_reports_to_parent_levels() {
        let grouper = MetricGrouper::new(MemorySink::default(), NoLevels).with_max_depth(2);
        let mut timer = grouper.start("request:GET:/index");
        timer.stop();
        timer.stop();

        assert_eq!(grouper.parent().durations("request").unwrap().count, 1);
        assert_eq!(grouper.parent().durations("request:GET").unwrap().count, 1);
        assert!(grouper.parent().durations("request:GET:/index").is_none());
    }

    #[test]
    fn test_grouper_over_shared_parent() {
        let sink = Arc::new(MemorySink::default());
        let grouper = MetricGrouper::new(Arc::clone(&sink), NoLevels);
        grouper.increment("hits:cache", 3);
        grouper.increment("hits:disk", -1);
        assert_eq!(sink.counter("hits"), Some(2));
    }
}
