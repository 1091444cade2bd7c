//! The flowrig pipeline
//!
//! Generator workers synthesize flow records in parallel, paced against a
//! simulated link rate; a single consumer re-establishes global timestamp
//! order through a chunking buffer, or merges per-port statistics, and
//! emits the result. This crate owns the concurrent plumbing and the
//! command-line driver; record synthesis itself lives in
//! `flowrig_payload`.

#![deny(clippy::cargo)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod chunker;
pub mod collector;
pub mod flows;
pub mod format;
pub mod plan;
pub mod ports;
pub mod progress;
pub mod queue;
pub mod worker;

/// Pipeline-level errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The output sink failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Generator construction was rejected.
    #[error(transparent)]
    Payload(#[from] flowrig_payload::Error),
    /// The run shape could not be resolved.
    #[error(transparent)]
    Plan(#[from] plan::Error),
    /// An output format or sort key string was not recognized.
    #[error(transparent)]
    Parse(#[from] format::ParseError),
    /// A worker or collector thread terminated abnormally.
    #[error("pipeline thread panicked")]
    ThreadPanic,
}

/// Totals reported after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Flows produced across all workers.
    pub flows_generated: u64,
    /// Flows the consumer actually observed.
    pub flows_collected: u64,
    /// Bytes carried by all generated flows.
    pub bytes_generated: u64,
}
