//! Segmentation of streamed replies into playback units.
//!
//! A streamed model reply becomes audible long before it finishes: the
//! segmenter cuts the token stream into ordered utterances that can be
//! synthesized and played independently. The cut point is a strategy, not a
//! hardcoded literal — a model may omit the marker entirely, in which case
//! the whole reply is flushed at stream end.

/// Default segmentation marker. The system instruction asks the model to
/// separate spoken thoughts with this character.
pub const DEFAULT_MARKER: char = '•';

/// Strategy for cutting a streamed reply into utterances.
pub trait UtteranceSegmenter: Send {
    /// Feeds streamed reply text; returns every segment completed by this
    /// chunk, trimmed, in order.
    fn push(&mut self, chunk: &str) -> Vec<String>;

    /// Flushes whatever is still buffered at end of stream.
    fn finish(&mut self) -> Option<String>;
}

/// Segmenter selection, resolved from configuration once per completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterKind {
    /// Cut on a single marker character (the original behavior).
    Marker(char),
    /// Cut on sentence-ending punctuation.
    Sentence,
}

impl Default for SegmenterKind {
    fn default() -> Self {
        Self::Marker(DEFAULT_MARKER)
    }
}

impl SegmenterKind {
    /// Builds a fresh segmenter for one streamed reply.
    pub fn build(&self) -> Box<dyn UtteranceSegmenter> {
        match self {
            Self::Marker(marker) => Box::new(MarkerSegmenter::new(*marker)),
            Self::Sentence => Box::new(SentenceSegmenter::default()),
        }
    }
}

/// Cuts the stream after every occurrence of a designated marker character.
/// The marker is kept at the end of the emitted segment.
#[derive(Debug)]
pub struct MarkerSegmenter {
    marker: char,
    buffer: String,
}

impl MarkerSegmenter {
    pub fn new(marker: char) -> Self {
        Self {
            marker,
            buffer: String::new(),
        }
    }
}

impl Default for MarkerSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl UtteranceSegmenter for MarkerSegmenter {
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut segments = Vec::new();
        while let Some(pos) = self.buffer.find(self.marker) {
            let end = pos + self.marker.len_utf8();
            let segment = self.buffer[..end].trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
            self.buffer.drain(..end);
        }
        segments
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

/// Cuts the stream after sentence-ending punctuation followed by
/// whitespace. A terminator at the very end of the buffer is left for
/// `finish`, since more of the sentence may still arrive.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

impl UtteranceSegmenter for SentenceSegmenter {
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut segments = Vec::new();
        loop {
            let boundary = self
                .buffer
                .char_indices()
                .zip(self.buffer.chars().skip(1))
                .find(|((_, c), next)| is_terminator(*c) && next.is_whitespace())
                .map(|((i, c), _)| i + c.len_utf8());
            let Some(end) = boundary else { break };
            let segment = self.buffer[..end].trim();
            if !segment.is_empty() {
                segments.push(segment.to_string());
            }
            self.buffer.drain(..end);
        }
        segments
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}
