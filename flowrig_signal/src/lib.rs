//! Module to signal cancellation across the flowrig pipeline.
//!
//! The pipeline runs one collector and many generator worker threads and
//! must be able to stop the fleet early: a worker hit an unrecoverable
//! error, or the collector's sink failed. This component carries that
//! one-time event.
//!
//! The mechanism has two halves, a `Broadcaster` and a `Watcher`. The
//! `Broadcaster` raises the signal exactly once; `Watcher` instances poll
//! for it from their hot loops. Polling is a single atomic load, cheap
//! enough for a per-record check. If multiple distinct events must be
//! tracked, multiple signal pairs are required.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Construct a connected `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let raised = Arc::new(AtomicBool::new(false));

    let w = Watcher {
        raised: Arc::clone(&raised),
    };
    let b = Broadcaster { raised };

    (w, b)
}

#[derive(Debug)]
/// Mechanism to notify every `Watcher` instance that the run is over.
///
/// There is only one `Broadcaster` per signal; raising it consumes it.
pub struct Broadcaster {
    raised: Arc<AtomicBool>,
}

impl Broadcaster {
    /// Raise the signal through to all `Watcher` instances, present and
    /// future.
    ///
    /// The store is a release so that anything written before the raise is
    /// visible to a watcher that observes it.
    pub fn signal(self) {
        self.raised.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
/// Mechanism to observe the signal, typically polled at the top of a
/// worker's generation loop.
pub struct Watcher {
    raised: Arc<AtomicBool>,
}

impl Watcher {
    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}
