//! flowrig: synthetic network-flow generation and collection.
//!
//! Two subcommands share one generator fleet: `flows` streams
//! time-ordered per-flow records to stdout, `port` aggregates the same
//! traffic into per-port statistics. Progress and diagnostics go to
//! stderr; stdout carries data only.

use std::{
    io,
    process::ExitCode,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flowrig::{
    Error, RunSummary,
    flows::{self, FlowRunOptions},
    format::{FlowFormat, SortKey},
    plan::{self, PlanRequest, RunPlan},
    ports::{self, PortRunOptions, PortSortKey},
    progress::ProgressStyle,
};
use flowrig_payload::{GeneratorConfig, TrafficPattern, addr};

#[derive(Parser)]
#[clap(name = "flowrig", version, about = "Synthetic network-flow generation and collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate flow records and emit them in global timestamp order
    Flows(FlowsCommand),
    /// Generate flows and aggregate per-port statistics
    Port(PortCommand),
}

#[derive(Args)]
struct CommonArgs {
    /// Number of generator threads (1-100)
    #[clap(short = 'n', long, default_value_t = 10)]
    num_threads: usize,

    /// Flows generated by each thread
    #[clap(short = 'f', long, default_value_t = 0)]
    flows_per_thread: u64,

    /// Total flows to generate, spread across threads (overrides -f)
    #[clap(short = 't', long, default_value_t = 0)]
    total_flows: u64,

    /// First simulated timestamp, nanoseconds since the Unix epoch
    #[clap(long, default_value_t = plan::DEFAULT_START_TIMESTAMP_NS)]
    start_timestamp: u64,

    /// Last simulated timestamp, nanoseconds; 0 derives it from the flow
    /// count
    #[clap(long, default_value_t = 0)]
    end_timestamp: u64,

    /// Root seed for deterministic generation; defaults to the system
    /// clock
    #[clap(long)]
    seed: Option<u64>,

    /// Suppress the header line in text and CSV output
    #[clap(long)]
    no_header: bool,

    /// Progress style: bar, simple, spinner, none
    #[clap(long, default_value = "bar")]
    progress_style: ProgressStyle,

    /// Disable the progress display entirely
    #[clap(long)]
    no_progress: bool,
}

impl CommonArgs {
    fn progress_style(&self) -> ProgressStyle {
        if self.no_progress {
            ProgressStyle::None
        } else {
            self.progress_style
        }
    }

    fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(clock_seed)
    }
}

#[derive(Args)]
struct FlowsCommand {
    #[command(flatten)]
    common: CommonArgs,

    /// Output format: text, csv, json, json-pretty
    #[clap(short = 'o', long, default_value = "text")]
    output_format: FlowFormat,

    /// Sort each chunk by: timestamp, stream_id, src_ip, dst_ip, bytes,
    /// packets
    #[clap(short = 's', long, default_value = "timestamp")]
    sort_by: SortKey,

    /// Chunking time window in milliseconds
    #[clap(short = 'w', long, default_value_t = 10)]
    time_window: u64,

    /// Pretty-print JSON output
    #[clap(long)]
    pretty: bool,
}

#[derive(Args)]
struct PortCommand {
    #[command(flatten)]
    common: CommonArgs,

    /// Output format: text, csv, json, json-pretty
    #[clap(short = 'o', long, default_value = "text")]
    output_format: FlowFormat,

    /// Sort by: port, flows, tx_bytes, rx_bytes, total_bytes,
    /// tx_packets, rx_packets, total_packets
    #[clap(short = 's', long, default_value = "total_bytes")]
    sort_by: PortSortKey,

    /// Show only the top N ports (0 = all)
    #[clap(long, default_value_t = 0)]
    top: usize,

    /// Pretty-print JSON output
    #[clap(long)]
    pretty: bool,
}

/// The built-in traffic profile: a 10 Gbps mixed-enterprise blend.
fn default_generator_config() -> GeneratorConfig {
    GeneratorConfig {
        bandwidth_gbps: 10.0,
        source_subnets: vec!["192.168.1.0/24".to_string(), "192.168.2.0/24".to_string()],
        destination_subnets: vec!["10.0.0.0/8".to_string(), "172.16.0.0/12".to_string()],
        source_weights: vec![70.0, 30.0],
        min_packet_size: 64,
        average_packet_size: 800,
        max_packet_size: 1500,
        traffic_patterns: vec![
            TrafficPattern::new("web_traffic", 40.0),
            TrafficPattern::new("dns_traffic", 20.0),
            TrafficPattern::new("database_traffic", 15.0),
            TrafficPattern::new("ssh_traffic", 10.0),
            TrafficPattern::new("random", 15.0),
        ],
        ..GeneratorConfig::default()
    }
}

fn clock_seed() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

fn resolve_plan(common: &CommonArgs, config: &GeneratorConfig) -> Result<RunPlan, Error> {
    let flows_per_second =
        addr::flows_per_second(config.bandwidth_gbps, config.average_packet_size);
    Ok(RunPlan::resolve(PlanRequest {
        workers: common.num_threads,
        flows_per_worker: common.flows_per_thread,
        total_flows: common.total_flows,
        start_timestamp_ns: common.start_timestamp,
        end_timestamp_ns: common.end_timestamp,
        flows_per_second,
    })?)
}

fn effective_format(format: FlowFormat, pretty: bool) -> FlowFormat {
    if pretty && format == FlowFormat::Json {
        FlowFormat::JsonPretty
    } else {
        format
    }
}

fn report_summary(plan: &RunPlan, summary: &RunSummary) {
    info!(
        threads = plan.workers,
        flows_generated = summary.flows_generated,
        flows_collected = summary.flows_collected,
        start_timestamp_ns = plan.start_timestamp_ns,
        end_timestamp_ns = plan.end_timestamp_ns,
        "summary"
    );
}

fn run_flows(cmd: FlowsCommand) -> Result<(), Error> {
    if cmd.time_window == 0 {
        return Err(plan::Error::ZeroTimeWindow.into());
    }

    let config = default_generator_config();
    let plan = resolve_plan(&cmd.common, &config)?;

    let options = FlowRunOptions {
        plan,
        config,
        seed: cmd.common.seed(),
        chunk_width_ns: cmd.time_window * 1_000_000,
        format: effective_format(cmd.output_format, cmd.pretty),
        sort_key: cmd.sort_by,
        no_header: cmd.common.no_header,
        progress_style: cmd.common.progress_style(),
    };

    let summary = flows::run(options, io::stdout())?;
    report_summary(&plan, &summary);
    Ok(())
}

fn run_port(cmd: PortCommand) -> Result<(), Error> {
    let config = default_generator_config();
    let plan = resolve_plan(&cmd.common, &config)?;

    let options = PortRunOptions {
        plan,
        config,
        seed: cmd.common.seed(),
        format: effective_format(cmd.output_format, cmd.pretty),
        sort_key: cmd.sort_by,
        top: cmd.top,
        no_header: cmd.common.no_header,
        progress_style: cmd.common.progress_style(),
    };

    let mut stdout = io::stdout();
    let summary = ports::run(options, &mut stdout)?;
    report_summary(&plan, &summary);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    // Usage errors exit 1 like every other failure; help and version
    // information exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let failed = err.use_stderr();
            let _ = err.print();
            return if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match cli.command {
        Commands::Flows(cmd) => run_flows(cmd),
        Commands::Port(cmd) => run_port(cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flows_surface_parses() {
        let cli = Cli::parse_from([
            "flowrig",
            "flows",
            "-n",
            "4",
            "-t",
            "1000",
            "-w",
            "5",
            "-o",
            "csv",
            "-s",
            "stream_id",
            "--seed",
            "42",
            "--no-header",
            "--no-progress",
        ]);
        let Commands::Flows(cmd) = cli.command else {
            panic!("expected flows subcommand");
        };
        assert_eq!(cmd.common.num_threads, 4);
        assert_eq!(cmd.common.total_flows, 1_000);
        assert_eq!(cmd.time_window, 5);
        assert_eq!(cmd.output_format, FlowFormat::Csv);
        assert_eq!(cmd.sort_by, SortKey::StreamId);
        assert_eq!(cmd.common.seed(), 42);
        assert!(cmd.common.no_header);
        assert_eq!(cmd.common.progress_style(), ProgressStyle::None);
    }

    #[test]
    fn port_surface_parses() {
        let cli = Cli::parse_from([
            "flowrig",
            "port",
            "-o",
            "json",
            "--pretty",
            "-s",
            "rx_bytes",
            "--top",
            "20",
            "--progress-style",
            "spinner",
        ]);
        let Commands::Port(cmd) = cli.command else {
            panic!("expected port subcommand");
        };
        assert_eq!(
            effective_format(cmd.output_format, cmd.pretty),
            FlowFormat::JsonPretty
        );
        assert_eq!(cmd.sort_by, PortSortKey::RxBytes);
        assert_eq!(cmd.top, 20);
        assert_eq!(cmd.common.progress_style(), ProgressStyle::Spinner);
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["flowrig", "flows"]);
        let Commands::Flows(cmd) = cli.command else {
            panic!("expected flows subcommand");
        };
        assert_eq!(cmd.common.num_threads, 10);
        assert_eq!(cmd.common.start_timestamp, 1_704_067_200_000_000_000);
        assert_eq!(cmd.common.end_timestamp, 0);
        assert_eq!(cmd.time_window, 10);
        assert_eq!(cmd.output_format, FlowFormat::Text);
        assert_eq!(cmd.sort_by, SortKey::Timestamp);
    }

    #[test]
    fn default_traffic_profile_is_valid() {
        let config = default_generator_config();
        config.validate().expect("profile must validate");
        let fps = addr::flows_per_second(config.bandwidth_gbps, config.average_packet_size);
        assert!((fps - 1_562_500.0).abs() < f64::EPSILON);
    }
}
