//! Playback buffer: restores sequence order before the transport.
//!
//! Synthesis completes out of order; the transport must never hear audio
//! out of order. The buffer is a small explicit state machine — a
//! next-expected-index cursor plus a sparse map of early arrivals — so the
//! ordering guarantee does not lean on any scheduling property of the
//! runtime.

use crate::error::TransportError;
use crate::provider::TransportSink;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use vocalink_types::AudioUnit;

/// Per-session reorder buffer and mark bookkeeping.
pub struct PlaybackBuffer {
    sink: Arc<dyn TransportSink>,
    stream_sid: Option<String>,
    next_index: u64,
    pending: BTreeMap<u64, AudioUnit>,
    marks: Vec<String>,
}

impl PlaybackBuffer {
    pub fn new(sink: Arc<dyn TransportSink>) -> Self {
        Self {
            sink,
            stream_sid: None,
            next_index: 0,
            pending: BTreeMap::new(),
            marks: Vec::new(),
        }
    }

    /// Binds the transport stream id assigned at call start. Units cannot
    /// be delivered before this.
    pub fn set_stream_sid(&mut self, stream_sid: impl Into<String>) {
        self.stream_sid = Some(stream_sid.into());
    }

    /// Accepts one synthesized unit in arbitrary arrival order.
    ///
    /// A unit matching the cursor is delivered immediately, the cursor
    /// advances, and any buffered successors that now match are drained in
    /// order. A unit ahead of the cursor is held. A unit behind the cursor
    /// was already delivered and is dropped.
    pub async fn accept(&mut self, unit: AudioUnit) -> Result<(), TransportError> {
        if unit.index < self.next_index {
            warn!(index = unit.index, "duplicate audio unit dropped");
            return Ok(());
        }
        if unit.index > self.next_index {
            debug!(
                index = unit.index,
                expected = self.next_index,
                "holding out-of-order audio unit"
            );
            if self.pending.insert(unit.index, unit).is_some() {
                warn!("replaced duplicate pending audio unit");
            }
            return Ok(());
        }

        self.deliver(unit).await?;
        while let Some(next) = self.pending.remove(&self.next_index) {
            self.deliver(next).await?;
        }
        Ok(())
    }

    async fn deliver(&mut self, unit: AudioUnit) -> Result<(), TransportError> {
        let Some(stream_sid) = self.stream_sid.as_deref() else {
            warn!(index = unit.index, "no stream id bound, discarding audio unit");
            self.next_index += 1;
            return Ok(());
        };
        self.sink
            .send_audio(stream_sid, &unit.payload, &unit.label)
            .await?;
        self.marks.push(unit.label);
        self.next_index += 1;
        Ok(())
    }

    /// Removes an acknowledged mark label.
    pub fn ack_mark(&mut self, name: &str) {
        self.marks.retain(|mark| mark != name);
    }

    /// Labels delivered to the transport but not yet acknowledged.
    pub fn pending_marks(&self) -> &[String] {
        &self.marks
    }

    /// Units held waiting for earlier indices.
    pub fn pending_units(&self) -> usize {
        self.pending.len()
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Drops held units and pending marks. Part of session teardown.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.marks.clear();
    }
}
