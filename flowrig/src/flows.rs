//! The `flows` pipeline: generator workers fanned into one ordered
//! collector.

use std::{io::Write, sync::Arc, thread, time::Duration};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use flowrig_payload::GeneratorConfig;

use crate::{
    Error, RunSummary,
    collector::Collector,
    format::{FlowFormat, SortKey},
    plan::RunPlan,
    progress::{ProgressStyle, ProgressTracker},
    queue::{self, Queue},
    worker,
};

/// Interval between progress-line refreshes.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Everything a flow-collection run needs, resolved by the driver.
#[derive(Debug, Clone)]
pub struct FlowRunOptions {
    /// Resolved run shape.
    pub plan: RunPlan,
    /// Base generator configuration; the per-worker quota and start
    /// timestamp are stamped in from the plan.
    pub config: GeneratorConfig,
    /// Root seed; each worker draws its own stream seed from it.
    pub seed: u64,
    /// Chunking window width.
    pub chunk_width_ns: u64,
    /// Output serialization.
    pub format: FlowFormat,
    /// Chunk ordering.
    pub sort_key: SortKey,
    /// Suppress the header line.
    pub no_header: bool,
    /// Progress display style.
    pub progress_style: ProgressStyle,
}

/// Run the flow pipeline to completion, writing records to `writer`.
///
/// # Errors
///
/// Surfaces sink failures and panicked pipeline threads. Workers that
/// fail to start are logged and contribute zero flows; the run itself
/// still completes.
pub fn run<W>(options: FlowRunOptions, writer: W) -> Result<RunSummary, Error>
where
    W: Write + Send + 'static,
{
    // Configuration problems are fatal before any thread starts.
    flowrig_payload::FlowGenerator::new(options.config.clone())?;

    let plan = options.plan;
    let queue = Arc::new(Queue::new(queue::DEFAULT_CAPACITY));
    let progress = ProgressTracker::new(
        plan.start_timestamp_ns,
        plan.end_timestamp_ns,
        plan.workers,
        options.progress_style,
        PROGRESS_INTERVAL,
    );
    let display = progress.spawn_display();
    let (cancel, broadcaster) = flowrig_signal::signal();

    let collector = Collector::new(
        Arc::clone(&queue),
        options.chunk_width_ns,
        writer,
        options.format,
        options.sort_key,
        options.no_header,
    );
    let collector_queue = Arc::clone(&queue);
    let collector_handle = thread::spawn(move || {
        let result = collector.run();
        if result.is_err() {
            // A dead sink must not leave producers blocked on a full
            // queue: raise the signal and let their pushes drop.
            broadcaster.signal();
            collector_queue.set_done();
        }
        result
    });

    let mut root = StdRng::seed_from_u64(options.seed);
    let mut worker_handles = Vec::with_capacity(plan.workers);
    for index in 0..plan.workers {
        let mut config = options.config.clone();
        config.max_flows = plan.flows_per_worker;
        config.start_timestamp_ns = plan.start_timestamp_ns;
        let seed: u64 = root.random();
        worker_handles.push(worker::spawn_flow_worker(
            index,
            config,
            seed,
            Arc::clone(&queue),
            Arc::clone(&progress),
            cancel.clone(),
        ));
    }
    debug!(workers = plan.workers, "generator fleet running");

    let mut summary = RunSummary::default();
    let mut worker_panicked = false;
    for handle in worker_handles {
        match handle.join() {
            Ok(report) => {
                summary.flows_generated += report.flows_generated;
                summary.bytes_generated += report.bytes_generated;
            }
            Err(_) => worker_panicked = true,
        }
    }
    queue.set_done();

    let collected = collector_handle.join().map_err(|_| Error::ThreadPanic)?;
    progress.finish(display);
    summary.flows_collected = collected?;

    if worker_panicked {
        return Err(Error::ThreadPanic);
    }

    info!(
        flows_generated = summary.flows_generated,
        flows_collected = summary.flows_collected,
        "flow run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::Mutex,
    };

    use flowrig_payload::TrafficPattern;

    use super::*;
    use crate::plan::PlanRequest;

    #[derive(Debug, Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("buffer lock").clone()).expect("utf8 output")
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn options(workers: usize, flows_per_worker: u64) -> FlowRunOptions {
        let config = GeneratorConfig {
            bandwidth_gbps: 10.0,
            start_timestamp_ns: 1_000_000,
            source_subnets: vec!["192.168.1.0/24".to_string()],
            destination_subnets: vec!["10.0.0.0/8".to_string()],
            traffic_patterns: vec![TrafficPattern::new("random", 100.0)],
            ..GeneratorConfig::default()
        };
        let plan = RunPlan::resolve(PlanRequest {
            workers,
            flows_per_worker,
            total_flows: 0,
            start_timestamp_ns: 1_000_000,
            end_timestamp_ns: 0,
            flows_per_second: 1_562_500.0,
        })
        .expect("valid plan");

        FlowRunOptions {
            plan,
            config,
            seed: 42,
            chunk_width_ns: 10_000_000,
            format: FlowFormat::Csv,
            sort_key: SortKey::Timestamp,
            no_header: true,
            progress_style: ProgressStyle::None,
        }
    }

    #[test]
    fn generated_and_collected_totals_agree() {
        let buffer = SharedBuf::default();
        let summary = run(options(3, 200), buffer.clone()).expect("run succeeds");

        assert_eq!(summary.flows_generated, 600);
        assert_eq!(summary.flows_collected, 600);
        assert_eq!(buffer.contents().lines().count(), 600);
    }

    #[test]
    fn output_is_globally_timestamp_ordered() {
        let buffer = SharedBuf::default();
        run(options(4, 250), buffer.clone()).expect("run succeeds");

        let stamps: Vec<u64> = buffer
            .contents()
            .lines()
            .map(|line| {
                line.split(',')
                    .nth(1)
                    .expect("timestamp field")
                    .parse()
                    .expect("numeric timestamp")
            })
            .collect();
        assert_eq!(stamps.len(), 1_000);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn seeded_runs_are_reproducible_single_threaded() {
        let first = SharedBuf::default();
        let second = SharedBuf::default();
        run(options(1, 300), first.clone()).expect("run succeeds");
        run(options(1, 300), second.clone()).expect("run succeeds");
        assert_eq!(first.contents(), second.contents());
    }

    #[test]
    fn invalid_config_fails_before_spawning() {
        let mut options = options(1, 10);
        options.config.traffic_patterns.clear();
        let err = run(options, SharedBuf::default()).unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
    }

    #[test]
    fn failing_sink_does_not_hang_the_pipeline() {
        #[derive(Debug)]
        struct BrokenPipe;

        impl Write for BrokenPipe {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let err = run(options(2, 50_000), BrokenPipe).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
