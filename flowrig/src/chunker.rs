//! Time-bucketed reordering buffer.
//!
//! Each worker produces records in strictly increasing timestamp order,
//! but the queue interleaves streams arbitrarily. The chunker restores a
//! global order by bucketing records into fixed-width time windows and
//! releasing a window only once a record from a strictly later window has
//! been observed, at which point every producer has moved past it.
//!
//! The window width must dwarf producer skew for the release rule to be
//! airtight; a record that lands in an already-released window is still
//! accepted and drains at flush time rather than being dropped.

use std::collections::BTreeMap;

use flowrig_payload::EnhancedFlowRecord;

/// Reordering buffer keyed on `first_timestamp_ns / chunk_width_ns`.
#[derive(Debug)]
pub struct TimestampChunker {
    chunk_width_ns: u64,
    chunks: BTreeMap<u64, Vec<EnhancedFlowRecord>>,
    oldest_chunk_id: u64,
    has_oldest: bool,
}

impl TimestampChunker {
    /// Construct a chunker with the given window width.
    ///
    /// # Panics
    ///
    /// Panics when `chunk_width_ns` is zero; the driver validates the
    /// time window before building a pipeline.
    #[must_use]
    pub fn new(chunk_width_ns: u64) -> Self {
        assert!(chunk_width_ns > 0, "chunk width must be non-zero");
        Self {
            chunk_width_ns,
            chunks: BTreeMap::new(),
            oldest_chunk_id: 0,
            has_oldest: false,
        }
    }

    /// Bucket one record. The first record ever seen pins the oldest
    /// window.
    pub fn add(&mut self, record: EnhancedFlowRecord) {
        let chunk_id = record.first_timestamp_ns / self.chunk_width_ns;
        self.chunks.entry(chunk_id).or_default().push(record);

        if !self.has_oldest {
            self.oldest_chunk_id = chunk_id;
            self.has_oldest = true;
        }
    }

    /// Whether the oldest window can be released: true once any record
    /// from a strictly later window has been seen.
    #[must_use]
    pub fn has_complete_chunk(&self) -> bool {
        if !self.has_oldest {
            return false;
        }
        self.chunks
            .keys()
            .next_back()
            .is_some_and(|latest| *latest > self.oldest_chunk_id)
    }

    /// Remove and return the oldest window, advancing past it. An empty
    /// vector is returned when the oldest id had no records (a gap in
    /// the timeline).
    pub fn take_complete_chunk(&mut self) -> Vec<EnhancedFlowRecord> {
        if !self.has_complete_chunk() {
            return Vec::new();
        }
        let chunk = self.chunks.remove(&self.oldest_chunk_id).unwrap_or_default();
        self.oldest_chunk_id += 1;
        chunk
    }

    /// Drain every remaining window in ascending id order.
    pub fn flush_all(&mut self) -> Vec<Vec<EnhancedFlowRecord>> {
        let drained = std::mem::take(&mut self.chunks);
        self.has_oldest = false;
        drained
            .into_values()
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Records currently buffered across all windows.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.chunks.values().map(Vec::len).sum()
    }

    /// Whether no records are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The configured window width.
    #[must_use]
    pub fn chunk_width_ns(&self) -> u64 {
        self.chunk_width_ns
    }
}
