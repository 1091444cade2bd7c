//! Traffic-pattern synthesizers.
//!
//! Each variant models one traffic class as a distribution over protocol,
//! ports, and packet length. Patterns hold no state: all randomness comes
//! from the caller's RNG and all addressing from the supplied [`Pools`],
//! so a pattern set can be shared freely across worker configurations.

use rand::Rng;

use crate::{
    addr::{self, Subnet},
    record::{FlowRecord, PROTO_TCP, PROTO_UDP},
};

const DATABASE_PORTS: [u16; 4] = [3306, 5432, 27017, 6379];
const SMTP_PORTS: [u16; 3] = [25, 587, 465];

/// Errors produced by the pattern factory.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pattern name is not one this crate knows how to synthesize.
    #[error("unknown pattern type: {0}")]
    UnknownPattern(String),
}

/// Address pools and packet-size bounds shared by every pattern call.
///
/// Constructed by the flow generator from its validated configuration:
/// when `source_weights` is non-empty its length matches
/// `source_subnets`.
#[derive(Debug, Clone, Copy)]
pub struct Pools<'a> {
    /// Candidate source subnets.
    pub source_subnets: &'a [Subnet],
    /// Candidate destination subnets.
    pub destination_subnets: &'a [Subnet],
    /// Percentage weights over `source_subnets`; empty means uniform.
    pub source_weights: &'a [f64],
    /// Smallest packet length a pattern may emit.
    pub min_packet_size: u32,
    /// Largest packet length a pattern may emit.
    pub max_packet_size: u32,
}

impl Pools<'_> {
    fn source_ip<R>(&self, rng: &mut R) -> u32
    where
        R: Rng + ?Sized,
    {
        addr::random_ip_from(rng, self.source_subnets, self.source_weights)
            .expect("source weights validated at generator construction")
    }

    fn destination_ip<R>(&self, rng: &mut R) -> u32
    where
        R: Rng + ?Sized,
    {
        addr::random_ip_from(rng, self.destination_subnets, &[])
            .expect("unweighted choice cannot fail on a non-empty pool")
    }
}

/// A traffic class: one synthesizer per named pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Mixed TCP/UDP traffic with uniformly random ports.
    Random,
    /// HTTP and HTTPS client traffic.
    Web,
    /// DNS queries.
    Dns,
    /// Interactive SSH sessions.
    Ssh,
    /// Database client traffic (MySQL, Postgres, MongoDB, Redis).
    Database,
    /// Mail submission and relay.
    Smtp,
    /// FTP control and data channels.
    Ftp,
}

impl Pattern {
    /// Resolve a configured pattern name, case-insensitively.
    ///
    /// Accepts the canonical `*_traffic` names, their short forms, and
    /// the legacy aliases `http_traffic`/`https_traffic` (web) and
    /// `email_traffic` (smtp).
    ///
    /// # Errors
    ///
    /// `Error::UnknownPattern` for anything else.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "web" | "web_traffic" | "http_traffic" | "https_traffic" => Ok(Self::Web),
            "dns" | "dns_traffic" => Ok(Self::Dns),
            "ssh" | "ssh_traffic" => Ok(Self::Ssh),
            "database" | "database_traffic" => Ok(Self::Database),
            "smtp" | "smtp_traffic" | "email_traffic" => Ok(Self::Smtp),
            "ftp" | "ftp_traffic" => Ok(Self::Ftp),
            _ => Err(Error::UnknownPattern(name.to_string())),
        }
    }

    /// Synthesize one flow of this class at `timestamp_ns`.
    pub fn generate<R>(&self, rng: &mut R, timestamp_ns: u64, pools: &Pools<'_>) -> FlowRecord
    where
        R: Rng + ?Sized,
    {
        let source_ip = pools.source_ip(rng);
        let destination_ip = pools.destination_ip(rng);

        let (protocol, source_port, destination_port, packet_length) = match self {
            Pattern::Random => {
                let protocol = if rng.random::<f64>() < 0.7 {
                    PROTO_TCP
                } else {
                    PROTO_UDP
                };
                (
                    protocol,
                    ephemeral_port(rng),
                    rng.random_range(1..=65535),
                    rng.random_range(pools.min_packet_size..=pools.max_packet_size),
                )
            }
            Pattern::Web => {
                let destination_port = if rng.random::<f64>() < 0.7 { 443 } else { 80 };
                // Bimodal: request-sized or content-sized.
                let packet_length = if rng.random::<f64>() < 0.4 {
                    rng.random_range(64..=200)
                } else {
                    rng.random_range(500..=pools.max_packet_size)
                };
                (PROTO_TCP, ephemeral_port(rng), destination_port, packet_length)
            }
            Pattern::Dns => (
                PROTO_UDP,
                ephemeral_port(rng),
                53,
                rng.random_range(64..=512),
            ),
            Pattern::Ssh => (
                PROTO_TCP,
                ephemeral_port(rng),
                22,
                rng.random_range(100..=400),
            ),
            Pattern::Database => {
                let destination_port = DATABASE_PORTS[rng.random_range(0..DATABASE_PORTS.len())];
                // Small queries vs large result sets.
                let packet_length = if rng.random::<f64>() < 0.3 {
                    rng.random_range(64..=300)
                } else {
                    rng.random_range(500..=pools.max_packet_size)
                };
                (PROTO_TCP, ephemeral_port(rng), destination_port, packet_length)
            }
            Pattern::Smtp => {
                let destination_port = SMTP_PORTS[rng.random_range(0..SMTP_PORTS.len())];
                (
                    PROTO_TCP,
                    ephemeral_port(rng),
                    destination_port,
                    rng.random_range(200..=pools.max_packet_size),
                )
            }
            Pattern::Ftp => {
                let destination_port = if rng.random::<f64>() < 0.5 { 20 } else { 21 };
                // Data channel moves bulk payloads, control stays chatty.
                let packet_length = if destination_port == 20 {
                    rng.random_range(1000..=pools.max_packet_size)
                } else {
                    rng.random_range(64..=500)
                };
                (PROTO_TCP, ephemeral_port(rng), destination_port, packet_length)
            }
        };

        FlowRecord {
            source_ip,
            destination_ip,
            source_port,
            destination_port,
            protocol,
            timestamp_ns,
            packet_length,
        }
    }
}

fn ephemeral_port<R>(rng: &mut R) -> u16
where
    R: Rng + ?Sized,
{
    rng.random_range(49152..=65535)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::SmallRng};

    use super::*;

    fn pools<'a>(src: &'a [Subnet], dst: &'a [Subnet]) -> Pools<'a> {
        Pools {
            source_subnets: src,
            destination_subnets: dst,
            source_weights: &[],
            min_packet_size: 64,
            max_packet_size: 1500,
        }
    }

    #[test]
    fn factory_resolves_canonical_names_and_aliases() {
        let cases = [
            ("random", Pattern::Random),
            ("WEB_TRAFFIC", Pattern::Web),
            ("http_traffic", Pattern::Web),
            ("https_traffic", Pattern::Web),
            ("dns_traffic", Pattern::Dns),
            ("ssh", Pattern::Ssh),
            ("database_traffic", Pattern::Database),
            ("smtp_traffic", Pattern::Smtp),
            ("email_traffic", Pattern::Smtp),
            ("Ftp_Traffic", Pattern::Ftp),
        ];
        for (name, expected) in cases {
            assert_eq!(Pattern::from_name(name).expect("known name"), expected);
        }
    }

    #[test]
    fn factory_rejects_unknown_names() {
        let err = Pattern::from_name("carrier_pigeon").unwrap_err();
        assert_eq!(err, Error::UnknownPattern("carrier_pigeon".to_string()));
    }

    #[test]
    fn web_flows_are_tcp_to_web_ports() {
        let mut rng = SmallRng::seed_from_u64(10);
        let src = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst = ["10.0.0.0/8".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        for _ in 0..10_000 {
            let flow = Pattern::Web.generate(&mut rng, 0, &pools);
            assert_eq!(flow.protocol, PROTO_TCP);
            assert!(flow.destination_port == 80 || flow.destination_port == 443);
            assert!((49152..=65535).contains(&flow.source_port));
            assert!((64..=1500).contains(&flow.packet_length));
        }
    }

    #[test]
    fn dns_flows_are_small_udp_queries() {
        let mut rng = SmallRng::seed_from_u64(11);
        let src = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst = ["8.8.8.0/24".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        for _ in 0..1_000 {
            let flow = Pattern::Dns.generate(&mut rng, 0, &pools);
            assert_eq!(flow.protocol, PROTO_UDP);
            assert_eq!(flow.destination_port, 53);
            assert!((64..=512).contains(&flow.packet_length));
        }
    }

    #[test]
    fn database_flows_target_known_ports() {
        let mut rng = SmallRng::seed_from_u64(12);
        let src = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst = ["10.0.0.0/8".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        for _ in 0..1_000 {
            let flow = Pattern::Database.generate(&mut rng, 0, &pools);
            assert_eq!(flow.protocol, PROTO_TCP);
            assert!(DATABASE_PORTS.contains(&flow.destination_port));
        }
    }

    #[test]
    fn ftp_data_channel_carries_bulk_packets() {
        let mut rng = SmallRng::seed_from_u64(13);
        let src = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst = ["10.0.0.0/8".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        let mut saw_data = false;
        let mut saw_control = false;
        for _ in 0..1_000 {
            let flow = Pattern::Ftp.generate(&mut rng, 0, &pools);
            match flow.destination_port {
                20 => {
                    saw_data = true;
                    assert!((1000..=1500).contains(&flow.packet_length));
                }
                21 => {
                    saw_control = true;
                    assert!((64..=500).contains(&flow.packet_length));
                }
                other => panic!("unexpected FTP port {other}"),
            }
        }
        assert!(saw_data && saw_control);
    }

    #[test]
    fn addresses_come_from_the_pools() {
        let mut rng = SmallRng::seed_from_u64(14);
        let src: [Subnet; 1] = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst: [Subnet; 1] = ["10.10.0.0/16".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        for _ in 0..1_000 {
            let flow = Pattern::Random.generate(&mut rng, 0, &pools);
            assert!(src[0].contains(flow.source_ip));
            assert!(dst[0].contains(flow.destination_ip));
        }
    }

    #[test]
    fn random_pattern_mixes_protocols() {
        let mut rng = SmallRng::seed_from_u64(15);
        let src = ["192.168.1.0/24".parse().expect("valid CIDR")];
        let dst = ["10.0.0.0/8".parse().expect("valid CIDR")];
        let pools = pools(&src, &dst);

        let mut tcp = 0usize;
        let draws = 10_000usize;
        for _ in 0..draws {
            let flow = Pattern::Random.generate(&mut rng, 0, &pools);
            assert!(flow.protocol == PROTO_TCP || flow.protocol == PROTO_UDP);
            if flow.protocol == PROTO_TCP {
                tcp += 1;
            }
        }
        let observed = tcp as f64 / draws as f64;
        assert!((observed - 0.7).abs() < 0.03, "TCP share {observed}");
    }
}
