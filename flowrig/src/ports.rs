//! Per-port aggregation: accumulation, merge, ordering, and rendering.
//!
//! Port mode skips the reordering buffer entirely: each worker folds its
//! flows into a private port map and the consumer merges the maps once
//! every worker has finished.

use std::{
    cmp::Reverse,
    io::{self, Write},
    str::FromStr,
};

use rustc_hash::FxHashMap;
use serde::Serialize;

use flowrig_payload::{FlowRecord, FlowStats};

use crate::format::{ParseError, indent_json};

/// A worker's private port table.
pub type PortMap = FxHashMap<u16, PortStat>;

/// Traffic totals observed for a single port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStat {
    /// The port number.
    pub port: u16,
    /// Flows touching this port. A flow whose source and destination
    /// ports coincide counts once.
    pub flow_count: u64,
    /// Bytes sent from this port.
    pub tx_bytes: u64,
    /// Bytes received on this port.
    pub rx_bytes: u64,
    /// Packets sent from this port.
    pub tx_packets: u64,
    /// Packets received on this port.
    pub rx_packets: u64,
}

impl PortStat {
    /// Bytes in both directions.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.tx_bytes + self.rx_bytes
    }

    /// Packets in both directions.
    #[must_use]
    pub fn total_packets(&self) -> u64 {
        self.tx_packets + self.rx_packets
    }
}

/// Fold one flow's statistics into the owning worker's map.
///
/// The source port accounts the flow as transmitted, the destination
/// port as received.
pub fn accumulate(map: &mut PortMap, flow: &FlowRecord, stats: &FlowStats) {
    let src = map.entry(flow.source_port).or_insert_with(|| PortStat {
        port: flow.source_port,
        ..PortStat::default()
    });
    src.flow_count += 1;
    src.tx_bytes += stats.byte_count;
    src.tx_packets += u64::from(stats.packet_count);

    let dst = map.entry(flow.destination_port).or_insert_with(|| PortStat {
        port: flow.destination_port,
        ..PortStat::default()
    });
    if flow.source_port != flow.destination_port {
        dst.flow_count += 1;
    }
    dst.rx_bytes += stats.byte_count;
    dst.rx_packets += u64::from(stats.packet_count);
}

/// Sum per-worker maps into one table.
#[must_use]
pub fn merge(maps: impl IntoIterator<Item = PortMap>) -> PortMap {
    let mut merged = PortMap::default();
    for map in maps {
        for (port, stat) in map {
            let entry = merged.entry(port).or_insert_with(|| PortStat {
                port,
                ..PortStat::default()
            });
            entry.flow_count += stat.flow_count;
            entry.tx_bytes += stat.tx_bytes;
            entry.rx_bytes += stat.rx_bytes;
            entry.tx_packets += stat.tx_packets;
            entry.rx_packets += stat.rx_packets;
        }
    }
    merged
}

/// Field the merged table is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortSortKey {
    /// Port number.
    Port,
    /// Flow count.
    Flows,
    /// Transmitted bytes.
    TxBytes,
    /// Received bytes.
    RxBytes,
    /// Bytes in both directions.
    #[default]
    TotalBytes,
    /// Transmitted packets.
    TxPackets,
    /// Received packets.
    RxPackets,
    /// Packets in both directions.
    TotalPackets,
}

impl PortSortKey {
    fn value_of(self, stat: &PortStat) -> u64 {
        match self {
            Self::Port => u64::from(stat.port),
            Self::Flows => stat.flow_count,
            Self::TxBytes => stat.tx_bytes,
            Self::RxBytes => stat.rx_bytes,
            Self::TotalBytes => stat.total_bytes(),
            Self::TxPackets => stat.tx_packets,
            Self::RxPackets => stat.rx_packets,
            Self::TotalPackets => stat.total_packets(),
        }
    }
}

impl FromStr for PortSortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "port" => Ok(Self::Port),
            "flows" | "flow_count" => Ok(Self::Flows),
            "tx_bytes" => Ok(Self::TxBytes),
            "rx_bytes" => Ok(Self::RxBytes),
            "total_bytes" => Ok(Self::TotalBytes),
            "tx_packets" => Ok(Self::TxPackets),
            "rx_packets" => Ok(Self::RxPackets),
            "total_packets" => Ok(Self::TotalPackets),
            _ => Err(ParseError::PortSortKey(s.to_string())),
        }
    }
}

/// Order the merged table descending by `key` (port ascending breaks
/// ties) and truncate to `top` entries when nonzero.
#[must_use]
pub fn sorted(map: &PortMap, key: PortSortKey, top: usize) -> Vec<PortStat> {
    let mut stats: Vec<PortStat> = map.values().copied().collect();
    stats.sort_by_key(|s| (Reverse(key.value_of(s)), s.port));
    if top > 0 {
        stats.truncate(top);
    }
    stats
}

#[derive(Serialize)]
struct JsonPort {
    port: u16,
    flows: u64,
    tx_bytes: u64,
    rx_bytes: u64,
    total_bytes: u64,
    tx_packets: u64,
    rx_packets: u64,
    total_packets: u64,
}

impl From<&PortStat> for JsonPort {
    fn from(stat: &PortStat) -> Self {
        Self {
            port: stat.port,
            flows: stat.flow_count,
            tx_bytes: stat.tx_bytes,
            rx_bytes: stat.rx_bytes,
            total_bytes: stat.total_bytes(),
            tx_packets: stat.tx_packets,
            rx_packets: stat.rx_packets,
            total_packets: stat.total_packets(),
        }
    }
}

/// Header line for the CSV port table.
#[must_use]
pub fn csv_header() -> &'static str {
    "port,flows,tx_bytes,rx_bytes,total_bytes,tx_packets,rx_packets,total_packets"
}

fn text_header() -> String {
    format!(
        "{:<8}{:<12}{:<16}{:<16}{:<16}{:<12}{:<12}{:<12}",
        "PORT",
        "FLOWS",
        "TX_BYTES",
        "RX_BYTES",
        "TOTAL_BYTES",
        "TX_PACKETS",
        "RX_PACKETS",
        "TOTAL_PACKETS"
    )
}

fn text_row(stat: &PortStat) -> String {
    format!(
        "{:<8}{:<12}{:<16}{:<16}{:<16}{:<12}{:<12}{:<12}",
        stat.port,
        stat.flow_count,
        stat.tx_bytes,
        stat.rx_bytes,
        stat.total_bytes(),
        stat.tx_packets,
        stat.rx_packets,
        stat.total_packets()
    )
}

fn csv_row(stat: &PortStat) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        stat.port,
        stat.flow_count,
        stat.tx_bytes,
        stat.rx_bytes,
        stat.total_bytes(),
        stat.tx_packets,
        stat.rx_packets,
        stat.total_packets()
    )
}

/// Render an ordered port table to `writer` in the requested format.
///
/// # Errors
///
/// Propagates sink failures.
pub fn emit<W: Write>(
    writer: &mut W,
    format: crate::format::FlowFormat,
    no_header: bool,
    stats: &[PortStat],
) -> io::Result<()> {
    use crate::format::FlowFormat;

    match format {
        FlowFormat::Text => {
            if !no_header {
                writeln!(writer, "{}", text_header())?;
            }
            for stat in stats {
                writeln!(writer, "{}", text_row(stat))?;
            }
        }
        FlowFormat::Csv => {
            if !no_header {
                writeln!(writer, "{}", csv_header())?;
            }
            for stat in stats {
                writeln!(writer, "{}", csv_row(stat))?;
            }
        }
        FlowFormat::Json => {
            write!(writer, "[")?;
            for (i, stat) in stats.iter().enumerate() {
                if i > 0 {
                    write!(writer, ",")?;
                }
                serde_json::to_writer(&mut *writer, &JsonPort::from(stat))?;
            }
            writeln!(writer, "]")?;
        }
        FlowFormat::JsonPretty => {
            if stats.is_empty() {
                writeln!(writer, "[]")?;
            } else {
                writeln!(writer, "[")?;
                for (i, stat) in stats.iter().enumerate() {
                    if i > 0 {
                        writeln!(writer, ",")?;
                    }
                    let body = serde_json::to_string_pretty(&JsonPort::from(stat))?;
                    write!(writer, "{}", indent_json(&body))?;
                }
                writeln!(writer)?;
                writeln!(writer, "]")?;
            }
        }
    }
    writer.flush()
}

/// Everything a port-aggregation run needs, resolved by the driver.
#[derive(Debug, Clone)]
pub struct PortRunOptions {
    /// Resolved run shape.
    pub plan: crate::plan::RunPlan,
    /// Base generator configuration; the per-worker quota and start
    /// timestamp are stamped in from the plan.
    pub config: flowrig_payload::GeneratorConfig,
    /// Root seed; each worker draws its own stream seed from it.
    pub seed: u64,
    /// Output serialization.
    pub format: crate::format::FlowFormat,
    /// Table ordering.
    pub sort_key: PortSortKey,
    /// Keep only the first `top` rows; zero keeps everything.
    pub top: usize,
    /// Suppress the header line.
    pub no_header: bool,
    /// Progress display style.
    pub progress_style: crate::progress::ProgressStyle,
}

/// Run the port pipeline: workers build private maps, the consumer
/// merges them after every worker has finished, then the ordered table
/// is written to `writer`.
///
/// # Errors
///
/// Surfaces sink failures and panicked worker threads.
pub fn run<W: Write>(
    options: PortRunOptions,
    writer: &mut W,
) -> Result<crate::RunSummary, crate::Error> {
    use std::{sync::Arc, time::Duration};

    use rand::{Rng, SeedableRng, rngs::StdRng};

    use crate::{Error, RunSummary, progress::ProgressTracker, worker};

    // Configuration problems are fatal before any thread starts.
    flowrig_payload::FlowGenerator::new(options.config.clone())?;

    let plan = options.plan;
    let progress = ProgressTracker::new(
        plan.start_timestamp_ns,
        plan.end_timestamp_ns,
        plan.workers,
        options.progress_style,
        Duration::from_millis(200),
    );
    let display = progress.spawn_display();
    let (cancel, _broadcaster) = flowrig_signal::signal();

    let mut root = StdRng::seed_from_u64(options.seed);
    let mut handles = Vec::with_capacity(plan.workers);
    for index in 0..plan.workers {
        let mut config = options.config.clone();
        config.max_flows = plan.flows_per_worker;
        config.start_timestamp_ns = plan.start_timestamp_ns;
        let seed: u64 = root.random();
        handles.push(worker::spawn_port_worker(
            index,
            config,
            seed,
            Arc::clone(&progress),
            cancel.clone(),
        ));
    }

    let mut summary = RunSummary::default();
    let mut maps = Vec::with_capacity(plan.workers);
    let mut worker_panicked = false;
    for handle in handles {
        match handle.join() {
            Ok((report, map)) => {
                summary.flows_generated += report.flows_generated;
                summary.bytes_generated += report.bytes_generated;
                maps.push(map);
            }
            Err(_) => worker_panicked = true,
        }
    }
    progress.finish(display);
    if worker_panicked {
        return Err(Error::ThreadPanic);
    }
    summary.flows_collected = summary.flows_generated;

    let merged = merge(maps);
    let table = sorted(&merged, options.sort_key, options.top);
    emit(writer, options.format, options.no_header, &table)?;

    tracing::info!(
        flows_generated = summary.flows_generated,
        ports = table.len(),
        "port run complete"
    );
    Ok(summary)
}
