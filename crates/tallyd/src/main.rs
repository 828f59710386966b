//! tallyd - process and host gauges as JSON lines.
//!
//! Registers the system gauge catalogue on an in-memory registry and prints
//! a snapshot of every instance once per interval.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod allocator;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "linux")]
use tally_core::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use tally_core::collector::mock::MockFs;
use tally_core::collector::FileSystem;
use tally_core::grouper::MetricGrouper;
use tally_core::metric::{LevelTable, MetricInstance};
use tally_core::sink::{MemoryRegistry, MemorySink, SinkConfig, Snapshot};
use tally_core::system::SystemMetrics;

use crate::allocator::JemallocMemory;

/// Name of the instance tallyd reports its own activity to.
const SELF_INSTANCE: &str = "tallyd";

/// Process and host gauges as JSON lines.
#[derive(Parser)]
#[command(name = "tallyd", about = "Process and host gauges as JSON lines", version)]
struct Args {
    /// Snapshot interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Append snapshots to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print a single snapshot and exit.
    #[arg(long)]
    once: bool,

    /// Group level of a top-level segment, as `segment=level`.
    /// Level 0 silences the segment. May be repeated.
    #[arg(short, long = "level", value_name = "SEGMENT=LEVEL", value_parser = LevelTable::parse_entry)]
    levels: Vec<(String, i32)>,

    /// How many identifier prefixes are recorded per call.
    #[arg(long, default_value = "1")]
    depth: usize,

    /// Samples kept per series.
    #[arg(long, default_value_t = SinkConfig::DEFAULT_SERIES_CAPACITY)]
    series_capacity: usize,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// One output line.
#[derive(Serialize)]
struct Report {
    timestamp: String,
    instances: BTreeMap<String, Snapshot>,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["tallyd", "tally_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Registers the gauge catalogue, reading memory figures from jemalloc.
fn register<F: FileSystem + 'static>(fs: F, proc_path: &str, registry: &MemoryRegistry) {
    let metrics = SystemMetrics::new(fs, proc_path);
    let memory = Arc::new(JemallocMemory::new(Arc::clone(metrics.collector())));
    let metrics = metrics.with_memory_source(memory);

    let stores = metrics.filestore_usage_metrics();
    info!("Watching {} file stores", stores.len());
    for (name, store) in &stores {
        debug!("{} -> {} ({})", name, store.mount_point, store.fs_type);
    }

    metrics.record_provider(registry);
}

/// Snapshots every instance, timing the snapshot on `recorder`.
fn tick(
    registry: &MemoryRegistry,
    recorder: &dyn MetricInstance,
    target: &str,
) -> Report {
    let mut timer = recorder.start("collect:snapshot");
    let instances = registry.snapshot_all();
    let elapsed = timer.stop();
    debug!("Snapshot took {} {}", elapsed, timer.time_unit());

    recorder.increment(&format!("snapshots:{}", target), 1);

    Report {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        instances,
    }
}

fn write_report(out: &mut dyn Write, report: &Report) -> io::Result<()> {
    serde_json::to_writer(&mut *out, report)?;
    out.write_all(b"\n")?;
    out.flush()
}

fn open_output(output: Option<&PathBuf>) -> io::Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("tallyd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, proc={}, depth={}, series_capacity={}",
        args.interval, args.proc_path, args.depth, args.series_capacity
    );

    let registry = MemoryRegistry::new(SinkConfig::new(args.series_capacity));

    #[cfg(target_os = "linux")]
    register(RealFs::new(), &args.proc_path, &registry);
    #[cfg(not(target_os = "linux"))]
    {
        warn!("No procfs on this platform, reporting a simulated host");
        register(MockFs::typical_system(), &args.proc_path, &registry);
    }

    let levels: LevelTable = args.levels.iter().cloned().collect();
    if !levels.is_empty() {
        info!("Group levels configured for {} segments", levels.len());
    }
    let recorder: MetricGrouper<Arc<MemorySink>, LevelTable> =
        MetricGrouper::new(registry.sink(SELF_INSTANCE), levels).with_max_depth(args.depth);

    let target = match &args.output {
        Some(path) => path.display().to_string(),
        None => "stdout".to_string(),
    };
    let mut out = match open_output(args.output.as_ref()) {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to open output {}: {}", target, e);
            std::process::exit(1);
        }
    };

    if args.once {
        let report = tick(&registry, &recorder, &target);
        if let Err(e) = write_report(&mut *out, &report) {
            error!("Failed to write snapshot: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting snapshot loop");
    let mut snapshot_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let report = tick(&registry, &recorder, &target);
        match write_report(&mut *out, &report) {
            Ok(()) => {
                snapshot_count += 1;
                debug!(
                    "Snapshot #{}: {} instances",
                    snapshot_count,
                    report.instances.len()
                );
            }
            Err(e) => error!("Failed to write snapshot: {}", e),
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete after {} snapshots", snapshot_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::collector::MockFs;

    #[test]
    fn tick_reports_every_instance() {
        let registry = MemoryRegistry::default();
        register(MockFs::typical_system(), "/proc", &registry);
        let recorder = MetricGrouper::new(registry.sink(SELF_INSTANCE), LevelTable::new());

        let first = tick(&registry, &recorder, "stdout");
        assert_eq!(
            first.instances.keys().collect::<Vec<_>>(),
            vec!["file", "memory", "runtime", "tallyd"]
        );
        assert_eq!(first.instances["runtime"].values["load"], 50);
        assert_eq!(first.instances["file"].values["file-/dev/sdb1-spaceUsed"], 25);

        let second = tick(&registry, &recorder, "stdout");
        let own = &second.instances["tallyd"];
        assert_eq!(own.counters["snapshots"], 1);
        assert_eq!(own.durations["collect"].count, 1);
    }

    #[test]
    fn silenced_segment_is_not_recorded() {
        let registry = MemoryRegistry::default();
        let recorder = MetricGrouper::new(
            registry.sink(SELF_INSTANCE),
            LevelTable::new().with("snapshots", 0),
        );

        tick(&registry, &recorder, "stdout");
        let own = registry.sink(SELF_INSTANCE).snapshot();
        assert!(own.counters.is_empty());
        assert_eq!(own.durations["collect"].count, 1);
    }

    #[test]
    fn report_is_one_json_line() {
        let report = Report {
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            instances: BTreeMap::from([("runtime".to_string(), Snapshot::default())]),
        };
        let mut buf = Vec::new();
        write_report(&mut buf, &report).unwrap();

        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["timestamp"], "2024-01-01T00:00:00.000Z");
        assert!(value["instances"]["runtime"]["counters"].is_object());
    }

    #[test]
    fn levels_parse_from_command_line() {
        let args = Args::try_parse_from(["tallyd", "-l", "query=0", "--level", "conn=2", "--once"])
            .unwrap();
        assert_eq!(
            args.levels,
            vec![("query".to_string(), 0), ("conn".to_string(), 2)]
        );
        assert!(args.once);
        assert_eq!(args.depth, 1);
        assert!(Args::try_parse_from(["tallyd", "-l", "nolevel"]).is_err());
    }
}
