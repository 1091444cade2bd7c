//! Generator configuration and validation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tolerance applied when checking that percentages sum to 100.
const PERCENT_TOLERANCE: f64 = 0.01;

/// Errors produced by [`GeneratorConfig::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Neither a bandwidth nor a direct flow rate was given.
    #[error("must specify either bandwidth_gbps or flows_per_second")]
    NoRateSpecified,
    /// No traffic patterns were configured.
    #[error("must specify at least one traffic pattern")]
    NoPatterns,
    /// The pattern percentages do not sum to 100.
    #[error("traffic pattern percentages must sum to 100, got {0}")]
    BadPatternSum(f64),
    /// The source or destination subnet list is empty.
    #[error("source and destination subnets cannot be empty")]
    NoSubnets,
    /// Source weights do not line up with the source subnets or do not
    /// sum to 100.
    #[error("source_weights must match source_subnets and sum to 100")]
    BadSourceWeights,
    /// The packet-size bounds are inverted.
    #[error("min_packet_size {min} exceeds max_packet_size {max}")]
    BadPacketRange {
        /// Configured minimum.
        min: u32,
        /// Configured maximum.
        max: u32,
    },
    /// The bidirectional mode string is not recognized.
    #[error("bidirectional_mode must be \"none\" or \"random\", got {0}")]
    BadBidiMode(String),
    /// The swap probability is outside the unit interval.
    #[error("bidirectional_probability must be within [0, 1], got {0}")]
    BadBidiProb(f64),
}

/// Whether generated flows may have their direction mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidirectionalMode {
    /// Flows always run source to destination.
    #[default]
    None,
    /// Each flow is mirrored with the configured probability.
    Random,
}

impl FromStr for BidirectionalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "random" => Ok(Self::Random),
            _ => Err(Error::BadBidiMode(s.to_string())),
        }
    }
}

/// One entry of the configured traffic mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficPattern {
    /// Pattern name understood by [`crate::Pattern::from_name`].
    pub pattern: String,
    /// Share of generated flows, in percent.
    pub percentage: f64,
}

impl TrafficPattern {
    /// Convenience constructor.
    #[must_use]
    pub fn new(pattern: impl Into<String>, percentage: f64) -> Self {
        Self {
            pattern: pattern.into(),
            percentage,
        }
    }
}

/// Configuration of one flow generator.
///
/// Built once per run, validated, then shared read-only with every
/// worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "snake_case")]
pub struct GeneratorConfig {
    /// Target link rate in gigabits per second. When positive this wins
    /// over `flows_per_second`.
    pub bandwidth_gbps: f64,
    /// Direct flow rate; consulted only when `bandwidth_gbps` is zero.
    pub flows_per_second: f64,
    /// Stop after this many flows; zero means no flow-count stop.
    pub max_flows: u64,
    /// Candidate source subnets in CIDR notation.
    pub source_subnets: Vec<String>,
    /// Candidate destination subnets in CIDR notation.
    pub destination_subnets: Vec<String>,
    /// Percentage weights over `source_subnets`; empty means uniform.
    pub source_weights: Vec<f64>,
    /// Smallest packet length to synthesize.
    pub min_packet_size: u32,
    /// Average packet length; drives the bandwidth-to-rate conversion
    /// and the statistics synthesizer.
    pub average_packet_size: u32,
    /// Largest packet length to synthesize.
    pub max_packet_size: u32,
    /// First simulated timestamp, nanoseconds since the Unix epoch; zero
    /// means "now".
    pub start_timestamp_ns: u64,
    /// The traffic mix. Percentages must sum to 100.
    pub traffic_patterns: Vec<TrafficPattern>,
    /// Whether flows may be mirrored after generation.
    pub bidirectional_mode: BidirectionalMode,
    /// Probability that a flow is mirrored when the mode is `random`.
    pub bidirectional_probability: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            bandwidth_gbps: 0.0,
            flows_per_second: 0.0,
            max_flows: 0,
            source_subnets: Vec::new(),
            destination_subnets: Vec::new(),
            source_weights: Vec::new(),
            min_packet_size: 64,
            average_packet_size: 800,
            max_packet_size: 1500,
            start_timestamp_ns: 0,
            traffic_patterns: Vec::new(),
            bidirectional_mode: BidirectionalMode::None,
            bidirectional_probability: 0.5,
        }
    }
}

impl GeneratorConfig {
    /// Check every configuration rule, reporting the first violation.
    ///
    /// # Errors
    ///
    /// One dedicated [`Error`] variant per broken rule.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bandwidth_gbps <= 0.0 && self.flows_per_second <= 0.0 {
            return Err(Error::NoRateSpecified);
        }

        if self.traffic_patterns.is_empty() {
            return Err(Error::NoPatterns);
        }
        let total: f64 = self.traffic_patterns.iter().map(|p| p.percentage).sum();
        if (total - 100.0).abs() > PERCENT_TOLERANCE {
            return Err(Error::BadPatternSum(total));
        }

        if self.source_subnets.is_empty() || self.destination_subnets.is_empty() {
            return Err(Error::NoSubnets);
        }

        if !self.source_weights.is_empty() {
            if self.source_weights.len() != self.source_subnets.len() {
                return Err(Error::BadSourceWeights);
            }
            let weight_sum: f64 = self.source_weights.iter().sum();
            if (weight_sum - 100.0).abs() > PERCENT_TOLERANCE {
                return Err(Error::BadSourceWeights);
            }
        }

        if self.min_packet_size > self.max_packet_size {
            return Err(Error::BadPacketRange {
                min: self.min_packet_size,
                max: self.max_packet_size,
            });
        }

        if !(0.0..=1.0).contains(&self.bidirectional_probability) {
            return Err(Error::BadBidiProb(self.bidirectional_probability));
        }

        Ok(())
    }
}
