//! Flow-record output formats and sort orders.
//!
//! Formats are streaming: the emitter writes its header lazily on the
//! first record, keeps JSON separator state between records, and closes
//! the array in [`FlowEmitter::finish`]. Text and CSV layouts are fixed;
//! JSON goes through `serde_json` so the compact and pretty forms stay
//! canonical.

use std::{
    cmp::Reverse,
    io::{self, Write},
    str::FromStr,
};

use serde::Serialize;

use flowrig_payload::EnhancedFlowRecord;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Errors produced when parsing user-facing format and sort strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a known output format.
    #[error("invalid output format: {0} (valid: text, csv, json, json-pretty)")]
    Format(String),
    /// Not a known flow sort field.
    #[error(
        "invalid sort field: {0} (valid: timestamp, stream_id, src_ip, dst_ip, bytes, packets)"
    )]
    SortKey(String),
    /// Not a known port sort field.
    #[error(
        "invalid sort field: {0} (valid: port, flows, tx_bytes, rx_bytes, total_bytes, tx_packets, rx_packets, total_packets)"
    )]
    PortSortKey(String),
    /// Not a known progress style.
    #[error("invalid progress style: {0} (valid: bar, simple, spinner, none)")]
    ProgressStyle(String),
}

/// Serialization applied to emitted flow records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowFormat {
    /// Fixed-width human-readable columns.
    #[default]
    Text,
    /// One record per line, comma separated.
    Csv,
    /// A single compact JSON array.
    Json,
    /// A JSON array indented two spaces per level.
    JsonPretty,
}

impl FromStr for FlowFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "json-pretty" | "pretty" => Ok(Self::JsonPretty),
            _ => Err(ParseError::Format(s.to_string())),
        }
    }
}

/// Field each released chunk is ordered by before emission.
///
/// Every key is stable with the first-packet timestamp as the secondary
/// order; byte and packet counts sort descending, the rest ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// First-packet timestamp, ascending.
    #[default]
    Timestamp,
    /// Producing stream, ascending.
    StreamId,
    /// Source address, ascending.
    SourceIp,
    /// Destination address, ascending.
    DestinationIp,
    /// Byte count, descending.
    ByteCount,
    /// Packet count, descending.
    PacketCount,
}

impl SortKey {
    /// Stable in-place sort of one chunk.
    pub fn sort(self, records: &mut [EnhancedFlowRecord]) {
        match self {
            Self::Timestamp => records.sort_by_key(|r| r.first_timestamp_ns),
            Self::StreamId => records.sort_by_key(|r| (r.stream_id, r.first_timestamp_ns)),
            Self::SourceIp => records.sort_by_key(|r| (r.source_ip, r.first_timestamp_ns)),
            Self::DestinationIp => {
                records.sort_by_key(|r| (r.destination_ip, r.first_timestamp_ns));
            }
            Self::ByteCount => {
                records.sort_by_key(|r| (Reverse(r.byte_count), r.first_timestamp_ns));
            }
            Self::PacketCount => {
                records.sort_by_key(|r| (Reverse(r.packet_count), r.first_timestamp_ns));
            }
        }
    }
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" | "time" | "ts" => Ok(Self::Timestamp),
            "stream_id" | "stream" | "sid" => Ok(Self::StreamId),
            "src_ip" | "source_ip" | "srcip" => Ok(Self::SourceIp),
            "dst_ip" | "destination_ip" | "dstip" => Ok(Self::DestinationIp),
            "bytes" | "byte_count" => Ok(Self::ByteCount),
            "packets" | "packet_count" | "pkts" => Ok(Self::PacketCount),
            _ => Err(ParseError::SortKey(s.to_string())),
        }
    }
}

#[derive(Serialize)]
struct JsonFlow {
    stream_id: u32,
    first_timestamp: u64,
    last_timestamp: u64,
    src_ip: String,
    dst_ip: String,
    src_port: u16,
    dst_port: u16,
    protocol: u8,
    packet_count: u32,
    byte_count: u64,
}

impl From<&EnhancedFlowRecord> for JsonFlow {
    fn from(record: &EnhancedFlowRecord) -> Self {
        Self {
            stream_id: record.stream_id,
            first_timestamp: record.first_timestamp_ns,
            last_timestamp: record.last_timestamp_ns,
            src_ip: record.source_ip_str(),
            dst_ip: record.destination_ip_str(),
            src_port: record.source_port,
            dst_port: record.destination_port,
            protocol: record.protocol,
            packet_count: record.packet_count,
            byte_count: record.byte_count,
        }
    }
}

/// Header line for the fixed-width text form.
#[must_use]
pub fn text_header() -> String {
    format!(
        "{:<10}{:<22}{:<22}{:<18}{:<10}{:<18}{:<10}{:<7}{:<10}{:<12}",
        "STREAM",
        "FIRST_TIMESTAMP",
        "LAST_TIMESTAMP",
        "SRC_IP",
        "SRC_PORT",
        "DST_IP",
        "DST_PORT",
        "PROTO",
        "PACKETS",
        "BYTES"
    )
}

/// Header line for the CSV form.
#[must_use]
pub fn csv_header() -> &'static str {
    "stream_id,first_timestamp,last_timestamp,src_ip,dst_ip,src_port,dst_port,protocol,packet_count,byte_count"
}

/// One record in the fixed-width text form: hex stream id and
/// `<seconds>.<9-digit-ns>` timestamps.
#[must_use]
pub fn text_row(record: &EnhancedFlowRecord) -> String {
    format!(
        "0x{:08x}  {:>12}.{:09}  {:>12}.{:09}  {:<18}{:<10}{:<18}{:<10}{:<7}{:<10}{:<12}",
        record.stream_id,
        record.first_timestamp_ns / NANOS_PER_SEC,
        record.first_timestamp_ns % NANOS_PER_SEC,
        record.last_timestamp_ns / NANOS_PER_SEC,
        record.last_timestamp_ns % NANOS_PER_SEC,
        record.source_ip_str(),
        record.source_port,
        record.destination_ip_str(),
        record.destination_port,
        record.protocol,
        record.packet_count,
        record.byte_count
    )
}

/// One record in the CSV form.
#[must_use]
pub fn csv_row(record: &EnhancedFlowRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        record.stream_id,
        record.first_timestamp_ns,
        record.last_timestamp_ns,
        record.source_ip_str(),
        record.destination_ip_str(),
        record.source_port,
        record.destination_port,
        record.protocol,
        record.packet_count,
        record.byte_count
    )
}

/// Indent every line of a pretty-printed JSON object by two spaces, for
/// nesting inside the output array.
pub(crate) fn indent_json(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    for (i, line) in body.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str("  ");
        out.push_str(line);
    }
    out
}

/// Streaming flow-record emitter.
#[derive(Debug)]
pub struct FlowEmitter<W> {
    writer: W,
    format: FlowFormat,
    no_header: bool,
    records_written: u64,
}

impl<W: Write> FlowEmitter<W> {
    /// Construct an emitter over `writer`.
    #[must_use]
    pub fn new(writer: W, format: FlowFormat, no_header: bool) -> Self {
        Self {
            writer,
            format,
            no_header,
            records_written: 0,
        }
    }

    fn start(&mut self) -> io::Result<()> {
        match self.format {
            FlowFormat::Text => {
                if !self.no_header {
                    writeln!(self.writer, "{}", text_header())?;
                }
            }
            FlowFormat::Csv => {
                if !self.no_header {
                    writeln!(self.writer, "{}", csv_header())?;
                }
            }
            FlowFormat::Json => write!(self.writer, "[")?,
            FlowFormat::JsonPretty => writeln!(self.writer, "[")?,
        }
        Ok(())
    }

    /// Write one record.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn emit(&mut self, record: &EnhancedFlowRecord) -> io::Result<()> {
        if self.records_written == 0 {
            self.start()?;
        }
        match self.format {
            FlowFormat::Text => writeln!(self.writer, "{}", text_row(record))?,
            FlowFormat::Csv => writeln!(self.writer, "{}", csv_row(record))?,
            FlowFormat::Json => {
                if self.records_written > 0 {
                    write!(self.writer, ",")?;
                }
                serde_json::to_writer(&mut self.writer, &JsonFlow::from(record))?;
            }
            FlowFormat::JsonPretty => {
                if self.records_written > 0 {
                    writeln!(self.writer, ",")?;
                }
                let body = serde_json::to_string_pretty(&JsonFlow::from(record))?;
                write!(self.writer, "{}", indent_json(&body))?;
            }
        }
        self.records_written += 1;
        Ok(())
    }

    /// Close the stream: terminate the JSON array and flush.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn finish(&mut self) -> io::Result<()> {
        match self.format {
            FlowFormat::Text | FlowFormat::Csv => {
                if self.records_written == 0 {
                    self.start()?;
                }
            }
            FlowFormat::Json => {
                if self.records_written == 0 {
                    write!(self.writer, "[")?;
                }
                writeln!(self.writer, "]")?;
            }
            FlowFormat::JsonPretty => {
                if self.records_written == 0 {
                    write!(self.writer, "[")?;
                } else {
                    writeln!(self.writer)?;
                }
                writeln!(self.writer, "]")?;
            }
        }
        self.writer.flush()
    }

    /// Records emitted so far.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}
