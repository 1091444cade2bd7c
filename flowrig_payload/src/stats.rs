//! Per-flow statistics synthesis.
//!
//! Given an already-shaped 5-tuple, derive a plausible packet count, byte
//! count, and duration for the whole flow. The tables here key on
//! protocol and destination port, mirroring the port conventions the
//! patterns emit.

use rand::Rng;

use crate::record::{FlowStats, PROTO_TCP, PROTO_UDP};

/// Derive aggregate statistics for a flow.
///
/// Packet counts follow the traffic class implied by `(protocol,
/// destination_port)`. Bytes are summed per packet with a ±20% spread
/// around `average_packet_size`, clamped to the valid packet range.
/// Duration is `(packets - 1)` inter-packet gaps except for DNS, whose
/// query/response exchange draws a total duration directly; single-packet
/// flows have zero duration.
pub fn synthesize<R>(
    rng: &mut R,
    average_packet_size: u32,
    protocol: u8,
    destination_port: u16,
) -> FlowStats
where
    R: Rng + ?Sized,
{
    let packet_count: u32 = match (protocol, destination_port) {
        (PROTO_TCP, 80 | 443) => rng.random_range(10..=50),
        (PROTO_TCP, 22) => rng.random_range(100..=500),
        (PROTO_TCP, 3306 | 5432 | 27017 | 6379) => rng.random_range(5..=100),
        (PROTO_TCP, 25 | 587 | 465) => rng.random_range(10..=50),
        (PROTO_TCP, _) => rng.random_range(5..=100),
        (PROTO_UDP, 53) => 2,
        (PROTO_UDP, _) => rng.random_range(1..=20),
        _ => rng.random_range(1..=10),
    };

    let spread = i64::from(average_packet_size) / 5;
    let mut byte_count: u64 = 0;
    for _ in 0..packet_count {
        let offset = rng.random_range(-spread..=spread);
        let size = (i64::from(average_packet_size) + offset).clamp(64, 1500);
        byte_count += size as u64;
    }

    let duration_ns = if packet_count == 1 {
        0
    } else {
        let gaps = u64::from(packet_count - 1);
        match (protocol, destination_port) {
            // DNS is a single exchange, not a packet train.
            (PROTO_UDP, 53) => rng.random_range(1_000_000..=50_000_000),
            (PROTO_TCP, 80 | 443) => gaps * rng.random_range(10_000..=100_000) * 1_000,
            (PROTO_TCP, 22) => gaps * rng.random_range(1_000..=50_000) * 1_000,
            (PROTO_TCP, 3306 | 5432 | 27017 | 6379) => {
                gaps * rng.random_range(1_000..=20_000) * 1_000
            }
            (PROTO_TCP, _) => gaps * rng.random_range(5_000..=50_000) * 1_000,
            (PROTO_UDP, _) => gaps * rng.random_range(100..=10_000) * 1_000,
            _ => gaps * rng.random_range(1_000..=20_000) * 1_000,
        }
    };

    FlowStats {
        packet_count,
        byte_count,
        duration_ns,
    }
}
