//! The flowrig payloads
//!
//! This library supports flow-record synthesis for the flowrig project:
//! address pools and CIDR arithmetic, weighted traffic-pattern
//! generators, a rate-paced per-worker generator state machine, and
//! per-flow statistics synthesis. Everything here is driven by a
//! caller-supplied RNG so that seeded runs are reproducible.

#![deny(clippy::cargo)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod addr;
pub mod config;
pub mod generator;
pub mod pattern;
pub mod record;
pub mod stats;

pub use config::{BidirectionalMode, GeneratorConfig, TrafficPattern};
pub use generator::FlowGenerator;
pub use pattern::Pattern;
pub use record::{EnhancedFlowRecord, FlowRecord, FlowStats};

/// Errors raised while constructing a generator from its configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] config::Error),
    /// An address or subnet input was rejected.
    #[error(transparent)]
    Addr(#[from] addr::Error),
    /// A configured pattern name was not recognized.
    #[error(transparent)]
    Pattern(#[from] pattern::Error),
}
