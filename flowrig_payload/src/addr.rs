//! IPv4 address pools, CIDR arithmetic, and weighted selection.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use rand::Rng;

/// Errors produced by address and selection utilities.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The CIDR string was malformed or its prefix out of range.
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    /// A choice was requested from an empty set.
    #[error("cannot choose from an empty set")]
    EmptyInput,
    /// The weight list does not line up with the item list.
    #[error("got {weights} weights for {items} items")]
    WeightSizeMismatch {
        /// Number of items offered.
        items: usize,
        /// Number of weights supplied.
        weights: usize,
    },
}

/// An IPv4 subnet parsed from CIDR notation.
///
/// The base address has its host bits masked off. A bare address parses
/// as a `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    base: u32,
    host_count: u32,
}

impl Subnet {
    /// Network base address, host byte order.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of addresses covered, including network and broadcast. A
    /// `/0` reports `u32::MAX` rather than 2^32.
    #[must_use]
    pub fn host_count(&self) -> u32 {
        self.host_count
    }

    /// Whether `ip` falls inside this subnet.
    #[must_use]
    pub fn contains(&self, ip: u32) -> bool {
        ip >= self.base && u64::from(ip) - u64::from(self.base) < u64::from(self.host_count)
    }

    /// Pick a random usable host address.
    ///
    /// Subnets with two or fewer addresses yield `base + 1`; anything
    /// larger draws uniformly while skipping the network and broadcast
    /// addresses.
    pub fn random_host<R>(&self, rng: &mut R) -> u32
    where
        R: Rng + ?Sized,
    {
        if self.host_count <= 2 {
            return self.base.wrapping_add(1);
        }
        self.base + rng.random_range(1..=self.host_count - 2)
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidCidr(s.to_string());

        let (ip_part, prefix_len) = match s.split_once('/') {
            None => (s, 32u32),
            Some((ip_part, prefix_part)) => {
                let prefix_len: u32 = prefix_part.parse().map_err(|_| invalid())?;
                if prefix_len > 32 {
                    return Err(invalid());
                }
                (ip_part, prefix_len)
            }
        };

        let base = parse_ipv4(ip_part).map_err(|_| invalid())?;
        let host_bits = 32 - prefix_len;
        let host_count = if host_bits >= 32 {
            u32::MAX
        } else {
            1u32 << host_bits
        };
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << host_bits
        };

        Ok(Self {
            base: base & mask,
            host_count,
        })
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // host_count is a power of two except in the /0 case.
        let host_bits = if self.host_count == u32::MAX {
            32
        } else {
            self.host_count.trailing_zeros()
        };
        write!(f, "{}/{}", ip_to_string(self.base), 32 - host_bits)
    }
}

/// Parse a dotted-quad IPv4 address into host byte order.
///
/// # Errors
///
/// Returns `Error::InvalidCidr` when the string is not a well-formed
/// IPv4 address.
pub fn parse_ipv4(s: &str) -> Result<u32, Error> {
    Ipv4Addr::from_str(s)
        .map(u32::from)
        .map_err(|_| Error::InvalidCidr(s.to_string()))
}

/// Render a host-byte-order IPv4 address as a dotted quad.
#[must_use]
pub fn ip_to_string(ip: u32) -> String {
    Ipv4Addr::from(ip).to_string()
}

/// Generate an unconstrained, plausible unicast IPv4 address: first octet
/// in `[1, 223]`, last octet in `[1, 254]`.
pub fn random_ipv4<R>(rng: &mut R) -> u32
where
    R: Rng + ?Sized,
{
    let a: u32 = rng.random_range(1..=223);
    let b: u32 = rng.random_range(0..=255);
    let c: u32 = rng.random_range(0..=255);
    let d: u32 = rng.random_range(1..=254);
    (a << 24) | (b << 16) | (c << 8) | d
}

/// Choose among `items` proportionally to `weights`.
///
/// An empty or flat weight list degrades to a uniform pick; otherwise the
/// cumulative sum is sampled with a uniform draw over the total and the
/// first bucket whose bound covers the draw wins.
///
/// # Errors
///
/// `Error::EmptyInput` when `items` is empty, `Error::WeightSizeMismatch`
/// when a non-empty weight list has a different length than `items`.
pub fn weighted_choice<'a, T, R>(rng: &mut R, items: &'a [T], weights: &[f64]) -> Result<&'a T, Error>
where
    R: Rng + ?Sized,
{
    if items.is_empty() {
        return Err(Error::EmptyInput);
    }
    if weights.is_empty() {
        return Ok(&items[rng.random_range(0..items.len())]);
    }
    if weights.len() != items.len() {
        return Err(Error::WeightSizeMismatch {
            items: items.len(),
            weights: weights.len(),
        });
    }
    if weights.windows(2).all(|w| w[0] == w[1]) {
        return Ok(&items[rng.random_range(0..items.len())]);
    }

    let total: f64 = weights.iter().sum();
    let draw = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (item, weight) in items.iter().zip(weights) {
        cumulative += weight;
        if draw <= cumulative {
            return Ok(item);
        }
    }
    // Floating-point shortfall at the upper edge lands on the last item.
    Ok(&items[items.len() - 1])
}

/// Pick a subnet per the configured weights, then a host inside it. An
/// empty pool falls back to an unconstrained address.
///
/// # Errors
///
/// See [`weighted_choice`].
pub fn random_ip_from<R>(rng: &mut R, subnets: &[Subnet], weights: &[f64]) -> Result<u32, Error>
where
    R: Rng + ?Sized,
{
    if subnets.is_empty() {
        return Ok(random_ipv4(rng));
    }
    let subnet = weighted_choice(rng, subnets, weights)?;
    Ok(subnet.random_host(rng))
}

/// Flow rate implied by a link rate and an average packet size:
/// `gbps * 1e9 / 8 / avg_bytes`.
#[must_use]
pub fn flows_per_second(bandwidth_gbps: f64, average_packet_size: u32) -> f64 {
    bandwidth_gbps * 1e9 / 8.0 / f64::from(average_packet_size)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::SmallRng};

    use super::*;

    #[test]
    fn parses_plain_cidr() {
        let subnet: Subnet = "192.168.1.0/24".parse().expect("valid CIDR");
        assert_eq!(subnet.base(), u32::from_be_bytes([192, 168, 1, 0]));
        assert_eq!(subnet.host_count(), 256);
    }

    #[test]
    fn masks_host_bits_of_base() {
        let subnet: Subnet = "10.1.2.3/8".parse().expect("valid CIDR");
        assert_eq!(subnet.base(), u32::from_be_bytes([10, 0, 0, 0]));
        assert_eq!(subnet.host_count(), 1 << 24);
    }

    #[test]
    fn bare_address_is_a_host_route() {
        let subnet: Subnet = "8.8.8.8".parse().expect("valid address");
        assert_eq!(subnet.base(), u32::from_be_bytes([8, 8, 8, 8]));
        assert_eq!(subnet.host_count(), 1);
    }

    #[test]
    fn zero_prefix_covers_everything() {
        let subnet: Subnet = "1.2.3.4/0".parse().expect("valid CIDR");
        assert_eq!(subnet.base(), 0);
        assert_eq!(subnet.host_count(), u32::MAX);
    }

    #[test]
    fn rejects_malformed_cidr() {
        for input in ["", "not-an-ip", "10.0.0.0/33", "10.0.0/24", "10.0.0.0/x"] {
            assert!(
                input.parse::<Subnet>().is_err(),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn tiny_subnet_yields_base_plus_one() {
        let mut rng = SmallRng::seed_from_u64(1);
        let subnet: Subnet = "10.0.0.0/31".parse().expect("valid CIDR");
        assert_eq!(subnet.random_host(&mut rng), subnet.base() + 1);
    }

    #[test]
    fn random_host_skips_network_and_broadcast() {
        let mut rng = SmallRng::seed_from_u64(2);
        let subnet: Subnet = "192.168.1.0/24".parse().expect("valid CIDR");
        let lo = u32::from_be_bytes([192, 168, 1, 1]);
        let hi = u32::from_be_bytes([192, 168, 1, 254]);
        for _ in 0..1_000 {
            let host = subnet.random_host(&mut rng);
            assert!(host >= lo && host <= hi, "{} out of range", ip_to_string(host));
        }
    }

    #[test]
    fn unconstrained_address_avoids_reserved_edges() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1_000 {
            let ip = random_ipv4(&mut rng);
            let first = ip >> 24;
            let last = ip & 0xFF;
            assert!((1..=223).contains(&first));
            assert!((1..=254).contains(&last));
        }
    }

    #[test]
    fn weighted_choice_rejects_misuse() {
        let mut rng = SmallRng::seed_from_u64(4);
        let empty: [u8; 0] = [];
        assert_eq!(
            weighted_choice(&mut rng, &empty, &[]).unwrap_err(),
            Error::EmptyInput
        );
        assert_eq!(
            weighted_choice(&mut rng, &[1, 2, 3], &[50.0, 50.0]).unwrap_err(),
            Error::WeightSizeMismatch {
                items: 3,
                weights: 2
            }
        );
    }

    #[test]
    fn flat_weights_degrade_to_uniform() {
        let mut rng = SmallRng::seed_from_u64(5);
        let items = ["a", "b", "c"];
        let mut seen = [false; 3];
        for _ in 0..1_000 {
            let pick = weighted_choice(&mut rng, &items, &[10.0, 10.0, 10.0]).expect("valid input");
            seen[items.iter().position(|i| i == pick).expect("item present")] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn weighted_frequencies_match_weights() {
        let mut rng = SmallRng::seed_from_u64(42);
        let items = [0usize, 1, 2, 3, 4];
        let weights = [40.0, 20.0, 20.0, 10.0, 10.0];
        let draws = 1_000_000usize;

        let mut counts = [0usize; 5];
        for _ in 0..draws {
            let pick = weighted_choice(&mut rng, &items, &weights).expect("valid input");
            counts[*pick] += 1;
        }

        for (count, weight) in counts.iter().zip(&weights) {
            let observed = *count as f64 / draws as f64;
            let expected = weight / 100.0;
            assert!(
                (observed - expected).abs() < 0.005,
                "observed {observed} for expected {expected}"
            );
        }
    }

    #[test]
    fn rate_arithmetic() {
        let fps = flows_per_second(10.0, 800);
        assert!((fps - 1_562_500.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn random_hosts_stay_inside_their_subnet(seed: u64, third_octet: u8) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let spec = format!("172.16.{third_octet}.0/24");
            let subnet: Subnet = spec.parse().expect("valid CIDR");
            for _ in 0..64 {
                prop_assert!(subnet.contains(subnet.random_host(&mut rng)));
            }
        }

        #[test]
        fn dotted_quad_round_trips(ip: u32) {
            prop_assert_eq!(parse_ipv4(&ip_to_string(ip)).expect("rendered address parses"), ip);
        }
    }
}
