//! Named [`MemorySink`]s behind the [`MetricProvider`] interface.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::metric::{MetricInstance, MetricProvider};
use crate::sink::{MemorySink, SinkConfig, Snapshot};

/// Creates one [`MemorySink`] per name on first use.
#[derive(Default)]
pub struct MemoryRegistry {
    config: SinkConfig,
    sinks: RwLock<BTreeMap<String, Arc<MemorySink>>>,
}

impl MemoryRegistry {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            sinks: RwLock::default(),
        }
    }

    /// Returns the sink registered under `name`, creating it if needed.
    pub fn sink(&self, name: &str) -> Arc<MemorySink> {
        if let Some(sink) = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(sink);
        }

        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            sinks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemorySink::new(self.config))),
        )
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshots every sink. Gauges are evaluated outside the registry lock.
    pub fn snapshot_all(&self) -> BTreeMap<String, Snapshot> {
        let sinks: Vec<(String, Arc<MemorySink>)> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, sink)| (name.clone(), Arc::clone(sink)))
            .collect();

        sinks
            .into_iter()
            .map(|(name, sink)| (name, sink.snapshot()))
            .collect()
    }
}

impl MetricProvider for MemoryRegistry {
    fn metric_instance(&self, name: &str) -> Arc<dyn MetricInstance> {
        self.sink(name)
    }
}
