//! The single consumer: pops records off the queue, restores global time
//! order through the chunker, and emits sorted chunks.

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use tracing::debug;

use flowrig_payload::EnhancedFlowRecord;

use crate::{
    chunker::TimestampChunker,
    format::{FlowEmitter, FlowFormat, SortKey},
    queue::Queue,
};

/// How long one queue poll may block before the collector re-checks
/// whether the producers have finished.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Consumer end of the flow pipeline.
#[derive(Debug)]
pub struct Collector<W> {
    queue: Arc<Queue<EnhancedFlowRecord>>,
    chunker: TimestampChunker,
    emitter: FlowEmitter<W>,
    sort_key: SortKey,
    flows_collected: u64,
}

impl<W: Write> Collector<W> {
    /// Construct a collector draining `queue` into `writer`.
    #[must_use]
    pub fn new(
        queue: Arc<Queue<EnhancedFlowRecord>>,
        chunk_width_ns: u64,
        writer: W,
        format: FlowFormat,
        sort_key: SortKey,
        no_header: bool,
    ) -> Self {
        Self {
            queue,
            chunker: TimestampChunker::new(chunk_width_ns),
            emitter: FlowEmitter::new(writer, format, no_header),
            sort_key,
            flows_collected: 0,
        }
    }

    /// Run until the queue reports done-and-empty, then flush every
    /// remaining window and close the output stream.
    ///
    /// Returns the number of records collected.
    ///
    /// # Errors
    ///
    /// Propagates sink failures; the caller is responsible for unblocking
    /// producers when that happens.
    pub fn run(mut self) -> io::Result<u64> {
        loop {
            match self.queue.try_pop(POLL_INTERVAL) {
                Some(record) => {
                    self.chunker.add(record);
                    self.flows_collected += 1;
                    while self.chunker.has_complete_chunk() {
                        let chunk = self.chunker.take_complete_chunk();
                        self.emit_chunk(chunk)?;
                    }
                }
                None => {
                    if self.queue.is_done() && self.queue.is_empty() {
                        break;
                    }
                }
            }
        }

        debug!(
            pending = self.chunker.pending_records(),
            "queue drained; flushing remaining windows"
        );
        for chunk in self.chunker.flush_all() {
            self.emit_chunk(chunk)?;
        }
        self.emitter.finish()?;

        Ok(self.flows_collected)
    }

    fn emit_chunk(&mut self, mut chunk: Vec<EnhancedFlowRecord>) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.sort_key.sort(&mut chunk);
        for record in &chunk {
            self.emitter.emit(record)?;
        }
        Ok(())
    }
}
