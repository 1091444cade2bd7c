//! Generator worker threads.
//!
//! One OS thread runs per stream id. Each thread owns its generator and
//! RNG stream, polls the cancellation watcher at the top of its loop,
//! and either pushes enhanced records into the shared queue (flow mode)
//! or folds statistics into a private port map (port mode). Port maps
//! travel back through the thread's join handle, which is also the
//! synchronization edge that lets the consumer read them.

use std::{sync::Arc, thread};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, error};

use flowrig_payload::{EnhancedFlowRecord, FlowGenerator, GeneratorConfig, stats};

use crate::{
    ports::{self, PortMap},
    progress::ProgressTracker,
    queue::Queue,
};

/// Totals reported by one worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerReport {
    /// The worker's stream id.
    pub stream_id: u32,
    /// Flows this worker produced.
    pub flows_generated: u64,
    /// Bytes carried by those flows.
    pub bytes_generated: u64,
}

/// Stream id carried by worker `index`. Stream ids are 1-based so that
/// id zero never appears in output.
#[must_use]
pub fn stream_id(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1)
}

/// Spawn a flow-mode worker: synthesize, enhance, and push records until
/// the quota is met or the run is cancelled.
pub fn spawn_flow_worker(
    index: usize,
    config: GeneratorConfig,
    seed: u64,
    queue: Arc<Queue<EnhancedFlowRecord>>,
    progress: Arc<ProgressTracker>,
    cancel: flowrig_signal::Watcher,
) -> thread::JoinHandle<WorkerReport> {
    thread::spawn(move || {
        let id = stream_id(index);
        let average_packet_size = config.average_packet_size;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut report = WorkerReport {
            stream_id: id,
            ..WorkerReport::default()
        };

        let mut generator = match FlowGenerator::new(config) {
            Ok(generator) => generator,
            Err(err) => {
                error!("stream {id:#010x} failed to start: {err}");
                return report;
            }
        };

        while !generator.is_done() {
            if cancel.is_signaled() {
                debug!("stream {id:#010x} cancelled");
                break;
            }

            let flow = generator.next_flow(&mut rng);
            let flow_stats =
                stats::synthesize(&mut rng, average_packet_size, flow.protocol, flow.destination_port);
            let record = EnhancedFlowRecord::enhance(id, &flow, &flow_stats);

            progress.update_timestamp(index, flow.timestamp_ns);
            progress.add_flows(1);
            progress.add_bytes(flow_stats.byte_count);
            report.flows_generated += 1;
            report.bytes_generated += flow_stats.byte_count;

            queue.push(record);
        }

        report
    })
}

/// Spawn a port-mode worker: synthesize flows and fold their statistics
/// into a thread-local port map.
pub fn spawn_port_worker(
    index: usize,
    config: GeneratorConfig,
    seed: u64,
    progress: Arc<ProgressTracker>,
    cancel: flowrig_signal::Watcher,
) -> thread::JoinHandle<(WorkerReport, PortMap)> {
    thread::spawn(move || {
        let id = stream_id(index);
        let average_packet_size = config.average_packet_size;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut report = WorkerReport {
            stream_id: id,
            ..WorkerReport::default()
        };
        let mut map = PortMap::default();

        let mut generator = match FlowGenerator::new(config) {
            Ok(generator) => generator,
            Err(err) => {
                error!("stream {id:#010x} failed to start: {err}");
                return (report, map);
            }
        };

        while !generator.is_done() {
            if cancel.is_signaled() {
                debug!("stream {id:#010x} cancelled");
                break;
            }

            let flow = generator.next_flow(&mut rng);
            let flow_stats =
                stats::synthesize(&mut rng, average_packet_size, flow.protocol, flow.destination_port);
            ports::accumulate(&mut map, &flow, &flow_stats);

            progress.update_timestamp(index, flow.timestamp_ns);
            progress.add_flows(1);
            progress.add_bytes(flow_stats.byte_count);
            report.flows_generated += 1;
            report.bytes_generated += flow_stats.byte_count;
        }

        (report, map)
    })
}
