//! The flow generator state machine.
//!
//! One generator runs per worker stream. It owns the simulated clock,
//! advancing it by a fixed inter-arrival interval derived from the
//! configured link rate, and delegates record synthesis to the weighted
//! traffic patterns.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::{
    Error,
    addr::{self, Subnet},
    config::{BidirectionalMode, GeneratorConfig},
    pattern::{Pattern, Pools},
    record::FlowRecord,
};

/// Per-worker flow producer.
///
/// Construction validates the configuration, resolves every pattern
/// name, and parses every subnet; after that the hot path is infallible
/// and each [`next_flow`](Self::next_flow) advances the simulated clock
/// by exactly the inter-arrival interval.
#[derive(Debug)]
pub struct FlowGenerator {
    config: GeneratorConfig,
    patterns: Vec<Pattern>,
    pattern_weights: Vec<f64>,
    source_subnets: Vec<Subnet>,
    destination_subnets: Vec<Subnet>,
    flows_per_second: f64,
    inter_arrival_ns: u64,
    start_timestamp_ns: u64,
    current_timestamp_ns: u64,
    flows_generated: u64,
}

impl FlowGenerator {
    /// Build a generator from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration fails validation, names an
    /// unknown pattern, or carries a malformed subnet. All of this
    /// surfaces before any worker thread starts.
    pub fn new(config: GeneratorConfig) -> Result<Self, Error> {
        config.validate()?;

        let mut patterns = Vec::with_capacity(config.traffic_patterns.len());
        let mut pattern_weights = Vec::with_capacity(config.traffic_patterns.len());
        for entry in &config.traffic_patterns {
            patterns.push(Pattern::from_name(&entry.pattern)?);
            pattern_weights.push(entry.percentage);
        }

        let source_subnets = parse_subnets(&config.source_subnets)?;
        let destination_subnets = parse_subnets(&config.destination_subnets)?;

        // Bandwidth wins when both rates are configured.
        let flows_per_second = if config.bandwidth_gbps > 0.0 {
            addr::flows_per_second(config.bandwidth_gbps, config.average_packet_size)
        } else {
            config.flows_per_second
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let inter_arrival_ns = (1e9 / flows_per_second) as u64;

        let start_timestamp_ns = if config.start_timestamp_ns > 0 {
            config.start_timestamp_ns
        } else {
            now_ns()
        };

        Ok(Self {
            config,
            patterns,
            pattern_weights,
            source_subnets,
            destination_subnets,
            flows_per_second,
            inter_arrival_ns,
            start_timestamp_ns,
            current_timestamp_ns: start_timestamp_ns,
            flows_generated: 0,
        })
    }

    /// Produce the next flow record and advance the simulated clock.
    ///
    /// Never fails; deciding when to stop is the caller's job, typically
    /// via [`is_done`](Self::is_done).
    pub fn next_flow<R>(&mut self, rng: &mut R) -> FlowRecord
    where
        R: Rng + ?Sized,
    {
        let pattern = self.select_pattern(rng);
        let pools = Pools {
            source_subnets: &self.source_subnets,
            destination_subnets: &self.destination_subnets,
            source_weights: &self.config.source_weights,
            min_packet_size: self.config.min_packet_size,
            max_packet_size: self.config.max_packet_size,
        };

        let mut flow = pattern.generate(rng, self.current_timestamp_ns, &pools);

        if self.config.bidirectional_mode == BidirectionalMode::Random
            && rng.random::<f64>() < self.config.bidirectional_probability
        {
            std::mem::swap(&mut flow.source_ip, &mut flow.destination_ip);
            std::mem::swap(&mut flow.source_port, &mut flow.destination_port);
        }

        self.flows_generated += 1;
        self.current_timestamp_ns += self.inter_arrival_ns;

        flow
    }

    /// Whether the configured flow quota has been reached.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.config.max_flows > 0 && self.flows_generated >= self.config.max_flows
    }

    /// Rewind the simulated clock and flow counter. Feeding a reset
    /// generator the same RNG stream reproduces the original sequence.
    pub fn reset(&mut self) {
        self.current_timestamp_ns = self.start_timestamp_ns;
        self.flows_generated = 0;
    }

    /// The effective flow rate.
    #[must_use]
    pub fn flows_per_second(&self) -> f64 {
        self.flows_per_second
    }

    /// Simulated gap between consecutive flows.
    #[must_use]
    pub fn inter_arrival_ns(&self) -> u64 {
        self.inter_arrival_ns
    }

    /// Timestamp the next flow will carry.
    #[must_use]
    pub fn current_timestamp_ns(&self) -> u64 {
        self.current_timestamp_ns
    }

    /// Flows produced since construction or the last reset.
    #[must_use]
    pub fn flows_generated(&self) -> u64 {
        self.flows_generated
    }

    /// The validated configuration this generator runs with.
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn select_pattern<R>(&self, rng: &mut R) -> Pattern
    where
        R: Rng + ?Sized,
    {
        *addr::weighted_choice(rng, &self.patterns, &self.pattern_weights)
            .expect("patterns validated non-empty at construction")
    }
}

fn parse_subnets(specs: &[String]) -> Result<Vec<Subnet>, Error> {
    specs
        .iter()
        .map(|spec| spec.parse::<Subnet>().map_err(Error::from))
        .collect()
}

fn now_ns() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::{addr::Subnet, config::TrafficPattern, record::PROTO_TCP};

    fn base_config() -> GeneratorConfig {
        GeneratorConfig {
            bandwidth_gbps: 10.0,
            average_packet_size: 800,
            max_flows: 0,
            start_timestamp_ns: 1_000_000_000,
            source_subnets: vec!["192.168.1.0/24".to_string()],
            destination_subnets: vec!["10.0.0.0/8".to_string()],
            traffic_patterns: vec![TrafficPattern::new("random", 100.0)],
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn rate_of_ten_gbps_at_800_bytes_paces_at_640ns() {
        let mut config = base_config();
        config.max_flows = 5;
        let mut generator = FlowGenerator::new(config).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(42);

        assert!((generator.flows_per_second() - 1_562_500.0).abs() < f64::EPSILON);
        assert_eq!(generator.inter_arrival_ns(), 640);

        let mut timestamps = Vec::new();
        while !generator.is_done() {
            timestamps.push(generator.next_flow(&mut rng).timestamp_ns);
        }
        assert_eq!(
            timestamps,
            vec![
                1_000_000_000,
                1_000_000_640,
                1_000_001_280,
                1_000_001_920,
                1_000_002_560
            ]
        );
    }

    #[test]
    fn timestamps_are_strictly_increasing_by_the_interval() {
        let mut generator = FlowGenerator::new(base_config()).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(7);
        let step = generator.inter_arrival_ns();

        let mut previous = None;
        for _ in 0..1_000 {
            let ts = generator.next_flow(&mut rng).timestamp_ns;
            if let Some(previous) = previous {
                assert_eq!(ts, previous + step);
            }
            previous = Some(ts);
        }
    }

    #[test]
    fn direct_rate_is_used_when_bandwidth_is_zero() {
        let mut config = base_config();
        config.bandwidth_gbps = 0.0;
        config.flows_per_second = 1_000.0;
        let generator = FlowGenerator::new(config).expect("valid config");
        assert_eq!(generator.inter_arrival_ns(), 1_000_000);
    }

    #[test]
    fn bandwidth_wins_over_direct_rate() {
        let mut config = base_config();
        config.flows_per_second = 1.0;
        let generator = FlowGenerator::new(config).expect("valid config");
        assert_eq!(generator.inter_arrival_ns(), 640);
    }

    #[test]
    fn source_addresses_honor_the_subnet_pool() {
        let mut generator = FlowGenerator::new(base_config()).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(9);
        let subnet: Subnet = "192.168.1.0/24".parse().expect("valid CIDR");
        let lo = subnet.base() + 1;
        let hi = subnet.base() + 254;

        for _ in 0..1_000 {
            let flow = generator.next_flow(&mut rng);
            assert!(flow.source_ip >= lo && flow.source_ip <= hi);
        }
    }

    #[test]
    fn certain_swap_mirrors_every_flow() {
        let mut config = base_config();
        config.source_subnets = vec!["10.0.0.0/24".to_string()];
        config.destination_subnets = vec!["8.8.8.0/24".to_string()];
        config.bidirectional_mode = BidirectionalMode::Random;
        config.bidirectional_probability = 1.0;
        let mut generator = FlowGenerator::new(config).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(11);

        let original_src: Subnet = "10.0.0.0/24".parse().expect("valid CIDR");
        let original_dst: Subnet = "8.8.8.0/24".parse().expect("valid CIDR");

        for _ in 0..100 {
            let flow = generator.next_flow(&mut rng);
            assert!(original_dst.contains(flow.source_ip));
            assert!(original_src.contains(flow.destination_ip));
        }
    }

    #[test]
    fn swap_disabled_keeps_direction() {
        let mut config = base_config();
        config.source_subnets = vec!["10.0.0.0/24".to_string()];
        config.destination_subnets = vec!["8.8.8.0/24".to_string()];
        // Probability is irrelevant while the mode stays `none`.
        config.bidirectional_probability = 1.0;
        let mut generator = FlowGenerator::new(config).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(12);

        let src: Subnet = "10.0.0.0/24".parse().expect("valid CIDR");
        for _ in 0..100 {
            let flow = generator.next_flow(&mut rng);
            assert!(src.contains(flow.source_ip));
        }
    }

    #[test]
    fn reset_replays_the_sequence() {
        let mut generator = FlowGenerator::new(base_config()).expect("valid config");

        let mut rng = SmallRng::seed_from_u64(13);
        let first: Vec<FlowRecord> = (0..100).map(|_| generator.next_flow(&mut rng)).collect();

        generator.reset();
        assert_eq!(generator.flows_generated(), 0);

        let mut rng = SmallRng::seed_from_u64(13);
        let second: Vec<FlowRecord> = (0..100).map(|_| generator.next_flow(&mut rng)).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn unknown_pattern_fails_construction() {
        let mut config = base_config();
        config.traffic_patterns = vec![TrafficPattern::new("quic_traffic", 100.0)];
        assert!(matches!(
            FlowGenerator::new(config).unwrap_err(),
            Error::Pattern(_)
        ));
    }

    #[test]
    fn malformed_subnet_fails_construction() {
        let mut config = base_config();
        config.source_subnets = vec!["not-a-subnet".to_string()];
        assert!(matches!(
            FlowGenerator::new(config).unwrap_err(),
            Error::Addr(_)
        ));
    }

    #[test]
    fn pattern_mix_respects_weights() {
        let mut config = base_config();
        config.traffic_patterns = vec![
            TrafficPattern::new("dns_traffic", 80.0),
            TrafficPattern::new("ssh_traffic", 20.0),
        ];
        let mut generator = FlowGenerator::new(config).expect("valid config");
        let mut rng = SmallRng::seed_from_u64(14);

        let draws = 10_000usize;
        let mut dns = 0usize;
        for _ in 0..draws {
            let flow = generator.next_flow(&mut rng);
            match flow.destination_port {
                53 => dns += 1,
                22 => assert_eq!(flow.protocol, PROTO_TCP),
                other => panic!("unexpected destination port {other}"),
            }
        }
        let observed = dns as f64 / draws as f64;
        assert!((observed - 0.8).abs() < 0.03, "DNS share {observed}");
    }
}
