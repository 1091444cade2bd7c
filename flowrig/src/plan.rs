//! Run planning: worker count, per-worker quotas, and the simulated
//! timestamp window.
//!
//! The flow quota and the timestamp window are two views of the same
//! quantity, linked by the flow rate. When the caller pins the window,
//! the quota is derived from it; otherwise the window is derived from
//! the quota.

use tracing::warn;

/// Default start of the simulated window: 2024-01-01T00:00:00Z.
pub const DEFAULT_START_TIMESTAMP_NS: u64 = 1_704_067_200_000_000_000;

/// Default per-worker flow quota when nothing else pins the run size.
pub const DEFAULT_FLOWS_PER_WORKER: u64 = 10_000;

/// Upper bound on generator workers.
pub const MAX_WORKERS: usize = 100;

/// Errors produced while resolving a run plan.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Worker count outside `[1, 100]`.
    #[error("number of threads must be between 1 and {MAX_WORKERS}, got {0}")]
    WorkerCount(usize),
    /// Chunking window of zero length.
    #[error("time window must be greater than zero")]
    ZeroTimeWindow,
    /// End of the window does not follow its start.
    #[error("end timestamp {end} must be greater than start timestamp {start}")]
    TimestampOrder {
        /// Configured start.
        start: u64,
        /// Configured end.
        end: u64,
    },
}

/// Caller-facing knobs that shape a run.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest {
    /// Requested worker count.
    pub workers: usize,
    /// Requested per-worker quota; zero means default.
    pub flows_per_worker: u64,
    /// Requested total flow count; zero means unset. Overrides
    /// `flows_per_worker`.
    pub total_flows: u64,
    /// Start of the simulated window.
    pub start_timestamp_ns: u64,
    /// End of the simulated window; zero derives it from the quota.
    pub end_timestamp_ns: u64,
    /// Effective flow rate, used to convert between flows and time.
    pub flows_per_second: f64,
}

/// Resolved shape of one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    /// Number of generator workers.
    pub workers: usize,
    /// Flow quota per worker.
    pub flows_per_worker: u64,
    /// Flows the run will generate: `workers * flows_per_worker`.
    pub total_flows: u64,
    /// Start of the simulated window.
    pub start_timestamp_ns: u64,
    /// End of the simulated window.
    pub end_timestamp_ns: u64,
}

impl RunPlan {
    /// Resolve a request into a concrete plan.
    ///
    /// With a pinned end timestamp the total flow count is
    /// `window_seconds * flows_per_second`, spread across workers
    /// rounding up; any explicit flow-count flags are overridden with a
    /// warning. Without one, the end timestamp is
    /// `start + total / flows_per_second` seconds.
    ///
    /// # Errors
    ///
    /// Rejects worker counts outside `[1, 100]` and windows that end
    /// before they start.
    pub fn resolve(request: PlanRequest) -> Result<Self, Error> {
        if request.workers == 0 || request.workers > MAX_WORKERS {
            return Err(Error::WorkerCount(request.workers));
        }
        let workers = request.workers;
        let workers_u64 = workers as u64;
        let start_timestamp_ns = request.start_timestamp_ns;

        if request.end_timestamp_ns > 0 {
            if request.end_timestamp_ns <= start_timestamp_ns {
                return Err(Error::TimestampOrder {
                    start: start_timestamp_ns,
                    end: request.end_timestamp_ns,
                });
            }

            let window_seconds =
                (request.end_timestamp_ns - start_timestamp_ns) as f64 / 1e9;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let derived_total = (window_seconds * request.flows_per_second) as u64;

            if request.total_flows > 0 || request.flows_per_worker > 0 {
                warn!(
                    total_flows = derived_total,
                    "end timestamp overrides flow-count options"
                );
            }

            let flows_per_worker = derived_total.div_ceil(workers_u64);
            Ok(Self {
                workers,
                flows_per_worker,
                total_flows: flows_per_worker * workers_u64,
                start_timestamp_ns,
                end_timestamp_ns: request.end_timestamp_ns,
            })
        } else {
            let flows_per_worker = if request.total_flows > 0 {
                request.total_flows.div_ceil(workers_u64)
            } else if request.flows_per_worker > 0 {
                request.flows_per_worker
            } else {
                DEFAULT_FLOWS_PER_WORKER
            };
            let total_flows = flows_per_worker * workers_u64;

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let window_ns = (total_flows as f64 / request.flows_per_second * 1e9) as u64;
            Ok(Self {
                workers,
                flows_per_worker,
                total_flows,
                start_timestamp_ns,
                end_timestamp_ns: start_timestamp_ns + window_ns,
            })
        }
    }
}
