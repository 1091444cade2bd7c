//! Run-progress gauges and the stderr display task.
//!
//! Workers publish their current simulated timestamp into a per-worker
//! atomic slot and bump shared flow/byte counters; a display thread
//! samples the gauges on an interval and renders a single line to
//! stderr. Progress is governed by the slowest worker, since the
//! collector cannot release a time window until every producer has moved
//! past it.

use std::{
    io::{self, Write},
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::format::ParseError;

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const BAR_WIDTH: usize = 40;

/// Rendering style for the progress line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressStyle {
    /// A bar with percentage, ETA, and throughput.
    #[default]
    Bar,
    /// Percentage and flow count only.
    Simple,
    /// A spinner with percentage and throughput.
    Spinner,
    /// No display thread at all.
    None,
}

impl FromStr for ProgressStyle {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "simple" => Ok(Self::Simple),
            "spinner" => Ok(Self::Spinner),
            "none" => Ok(Self::None),
            _ => Err(ParseError::ProgressStyle(s.to_string())),
        }
    }
}

/// Shared run-progress state.
#[derive(Debug)]
pub struct ProgressTracker {
    start_timestamp_ns: u64,
    end_timestamp_ns: u64,
    duration_ns: u64,
    started_at: Instant,
    worker_timestamps: Vec<AtomicU64>,
    flows: AtomicU64,
    bytes: AtomicU64,
    style: ProgressStyle,
    update_interval: Duration,
    shutdown: AtomicBool,
}

impl ProgressTracker {
    /// Construct gauges for `workers` producers covering the simulated
    /// window `[start_timestamp_ns, end_timestamp_ns]`.
    #[must_use]
    pub fn new(
        start_timestamp_ns: u64,
        end_timestamp_ns: u64,
        workers: usize,
        style: ProgressStyle,
        update_interval: Duration,
    ) -> Arc<Self> {
        let worker_timestamps = (0..workers)
            .map(|_| AtomicU64::new(start_timestamp_ns))
            .collect();
        Arc::new(Self {
            start_timestamp_ns,
            end_timestamp_ns,
            duration_ns: end_timestamp_ns.saturating_sub(start_timestamp_ns),
            started_at: Instant::now(),
            worker_timestamps,
            flows: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            style,
            update_interval,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Publish worker `index`'s current simulated timestamp. Out-of-range
    /// indices are ignored.
    pub fn update_timestamp(&self, index: usize, timestamp_ns: u64) {
        if let Some(slot) = self.worker_timestamps.get(index) {
            slot.store(timestamp_ns, Ordering::Relaxed);
        }
    }

    /// Count `n` more generated flows.
    pub fn add_flows(&self, n: u64) {
        self.flows.fetch_add(n, Ordering::Relaxed);
    }

    /// Count `n` more generated bytes.
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Completed fraction of the simulated window, in `[0, 1]`. The
    /// slowest worker determines progress.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.duration_ns == 0 {
            return 1.0;
        }
        let min_ts = self
            .worker_timestamps
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .min()
            .unwrap_or(self.end_timestamp_ns);
        let progressed = min_ts.saturating_sub(self.start_timestamp_ns);
        (progressed as f64 / self.duration_ns as f64).clamp(0.0, 1.0)
    }

    /// Estimated wall-clock time remaining; zero outside `(0, 1)`
    /// progress.
    #[must_use]
    pub fn eta(&self) -> Duration {
        let fraction = self.fraction();
        if fraction <= 0.0 || fraction >= 1.0 {
            return Duration::ZERO;
        }
        self.started_at.elapsed().mul_f64(1.0 / fraction - 1.0)
    }

    /// Generated flows per wall-clock second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.flows.load(Ordering::Relaxed) as f64 / elapsed
    }

    /// Generated bandwidth in gigabits per wall-clock second.
    #[must_use]
    pub fn bandwidth_gbps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.bytes.load(Ordering::Relaxed) as f64 * 8.0 / (elapsed * 1e9)
    }

    /// Total flows counted so far.
    #[must_use]
    pub fn flows(&self) -> u64 {
        self.flows.load(Ordering::Relaxed)
    }

    /// Total bytes counted so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Spawn the display thread, unless the style is `none`.
    #[must_use]
    pub fn spawn_display(self: &Arc<Self>) -> Option<thread::JoinHandle<()>> {
        if self.style == ProgressStyle::None {
            return None;
        }
        let tracker = Arc::clone(self);
        Some(thread::spawn(move || tracker.display_loop()))
    }

    /// Stop and join the display thread, terminating its line.
    pub fn finish(&self, handle: Option<thread::JoinHandle<()>>) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = handle {
            let _ = handle.join();
            eprintln!();
        }
    }

    fn display_loop(&self) {
        let mut spinner_frame = 0usize;
        while !self.shutdown.load(Ordering::Acquire) {
            thread::sleep(self.update_interval);
            self.render(&mut spinner_frame);
        }
        self.render(&mut spinner_frame);
    }

    fn render(&self, spinner_frame: &mut usize) {
        let percent = self.fraction() * 100.0;
        let line = match self.style {
            ProgressStyle::Bar => format!(
                "{} {percent:.1}% | ETA: {} | {:.0} flows/s | {:.2} Gbps",
                render_bar(self.fraction()),
                format_duration(self.eta()),
                self.throughput(),
                self.bandwidth_gbps()
            ),
            ProgressStyle::Simple => format!(
                "Progress: {percent:.1}% - {} flows - ETA: {}",
                format_count(self.flows()),
                format_duration(self.eta())
            ),
            ProgressStyle::Spinner => {
                let frame = SPINNER_FRAMES[*spinner_frame % SPINNER_FRAMES.len()];
                *spinner_frame += 1;
                format!(
                    "{frame} {percent:.1}% - {} flows - {:.0} flows/s",
                    format_count(self.flows()),
                    self.throughput()
                )
            }
            ProgressStyle::None => return,
        };
        eprint!("\r{line}");
        let _ = io::stderr().flush();
    }
}

fn render_bar(fraction: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = ((fraction * BAR_WIDTH as f64) as usize).min(BAR_WIDTH);
    let mut bar = String::with_capacity(BAR_WIDTH + 2);
    bar.push('[');
    for i in 0..BAR_WIDTH {
        if i < filled {
            bar.push('=');
        } else if i == filled {
            bar.push('>');
        } else {
            bar.push(' ');
        }
    }
    bar.push(']');
    bar
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

fn format_count(count: u64) -> String {
    if count < 1_000 {
        format!("{count}")
    } else if count < 1_000_000 {
        format!("{}K", count / 1_000)
    } else if count < 1_000_000_000 {
        format!("{}M", count / 1_000_000)
    } else {
        format!("{}G", count / 1_000_000_000)
    }
}
