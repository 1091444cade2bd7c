//! Flow record types shared by the generators and the pipeline.

use crate::addr;

/// IP protocol number for TCP.
pub const PROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;

/// A single synthesized flow: the classic 5-tuple plus the simulated
/// first-packet timestamp and a representative packet length.
///
/// Addresses are IPv4 in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRecord {
    /// Source IPv4 address.
    pub source_ip: u32,
    /// Destination IPv4 address.
    pub destination_ip: u32,
    /// Source transport port.
    pub source_port: u16,
    /// Destination transport port.
    pub destination_port: u16,
    /// IP protocol number.
    pub protocol: u8,
    /// Simulated first-packet timestamp, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Representative packet length in bytes.
    pub packet_length: u32,
}

impl FlowRecord {
    /// Header for the basic CSV form.
    #[must_use]
    pub fn csv_header() -> &'static str {
        "timestamp,src_ip,dst_ip,src_port,dst_port,protocol,length"
    }

    /// Render this record in the basic CSV form.
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.timestamp_ns,
            addr::ip_to_string(self.source_ip),
            addr::ip_to_string(self.destination_ip),
            self.source_port,
            self.destination_port,
            self.protocol,
            self.packet_length
        )
    }
}

/// Aggregate statistics synthesized for one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowStats {
    /// Packets carried by the flow.
    pub packet_count: u32,
    /// Bytes carried by the flow.
    pub byte_count: u64,
    /// Time between the first and last packet. Zero for single-packet
    /// flows.
    pub duration_ns: u64,
}

/// A flow record annotated with its producing stream and synthesized
/// per-flow aggregates. This is the unit that moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedFlowRecord {
    /// Identifier of the worker stream that produced the flow.
    pub stream_id: u32,
    /// First-packet timestamp, nanoseconds since the Unix epoch. The
    /// reordering buffer chunks on this field.
    pub first_timestamp_ns: u64,
    /// Last-packet timestamp.
    pub last_timestamp_ns: u64,
    /// Source IPv4 address.
    pub source_ip: u32,
    /// Destination IPv4 address.
    pub destination_ip: u32,
    /// Source transport port.
    pub source_port: u16,
    /// Destination transport port.
    pub destination_port: u16,
    /// IP protocol number.
    pub protocol: u8,
    /// Packets carried by the flow.
    pub packet_count: u32,
    /// Bytes carried by the flow.
    pub byte_count: u64,
}

impl EnhancedFlowRecord {
    /// Combine a raw flow with its synthesized statistics.
    #[must_use]
    pub fn enhance(stream_id: u32, flow: &FlowRecord, stats: &FlowStats) -> Self {
        Self {
            stream_id,
            first_timestamp_ns: flow.timestamp_ns,
            last_timestamp_ns: flow.timestamp_ns + stats.duration_ns,
            source_ip: flow.source_ip,
            destination_ip: flow.destination_ip,
            source_port: flow.source_port,
            destination_port: flow.destination_port,
            protocol: flow.protocol,
            packet_count: stats.packet_count,
            byte_count: stats.byte_count,
        }
    }

    /// Source address in dotted-quad form.
    #[must_use]
    pub fn source_ip_str(&self) -> String {
        addr::ip_to_string(self.source_ip)
    }

    /// Destination address in dotted-quad form.
    #[must_use]
    pub fn destination_ip_str(&self) -> String {
        addr::ip_to_string(self.destination_ip)
    }
}
