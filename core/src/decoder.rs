//! Incremental frame decoder.
//!
//! Turns arbitrarily chunked bytes into discrete [`Frame`]s. Each logical
//! record on the wire is a type line followed by a payload line:
//!
//! ```text
//! event: token
//! data: {"token":"hi"}
//! ```
//!
//! Only the unterminated tail of the stream is buffered between calls, so
//! memory use is bounded by one logical line rather than the stream length.

use crate::frame::Frame;
use crate::RillError;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Prefix of a type-indicator line
pub const EVENT_PREFIX: &str = "event:";
/// Prefix of a payload line
pub const DATA_PREFIX: &str = "data:";

pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Decoder configuration loaded from environment variables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Upper bound on the unterminated tail
    pub max_line_bytes: usize,
    /// Kind given to a payload line that has no pending type line.
    /// `None` drops such lines.
    pub default_kind: Option<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: std::env::var("RILL_MAX_LINE_BYTES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_MAX_LINE_BYTES),
            default_kind: std::env::var("RILL_DEFAULT_EVENT_KIND")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

impl DecoderConfig {
    pub fn with_default_kind(mut self, kind: impl Into<String>) -> Self {
        self.default_kind = Some(kind.into());
        self
    }

    pub fn with_max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line_bytes = limit;
        self
    }
}

/// Line and frame counters for one decoder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderStats {
    /// Complete lines processed
    pub lines: u64,
    /// Frames emitted
    pub frames: u64,
    /// Payload lines dropped because they were not well-formed JSON
    pub malformed: u64,
    /// Payload lines dropped because no type line preceded them
    pub orphaned: u64,
    /// Non-empty lines matching neither prefix
    pub ignored: u64,
}

/// A line outgrew `max_line_bytes`.
///
/// `frames` holds what the failing chunk completed before that line. They
/// are valid and in order; the stream itself cannot continue.
#[derive(Debug)]
pub struct LineOverflow {
    pub frames: Vec<Frame>,
    pub limit: usize,
}

impl LineOverflow {
    pub fn into_parts(self) -> (Vec<Frame>, RillError) {
        let limit = self.limit;
        (self.frames, RillError::LineTooLong { limit })
    }
}

impl From<LineOverflow> for RillError {
    fn from(overflow: LineOverflow) -> Self {
        RillError::LineTooLong {
            limit: overflow.limit,
        }
    }
}

/// Stateful decoder owning one decode buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    config: DecoderConfig,
    /// Bytes of the last incomplete line
    buffer: Vec<u8>,
    pending_kind: Option<String>,
    next_order: u64,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            pending_kind: None,
            next_order: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Feed one network chunk and return the frames it completed, in order.
    ///
    /// Never suspends. Fails once a line grows past `max_line_bytes`, whether
    /// it is still unterminated or completed inside this chunk. The failure
    /// carries every frame completed before the offending line, so the
    /// result does not depend on where the stream was split.
    pub fn feed(&mut self, chunk: &[u8]) -> std::result::Result<Vec<Frame>, LineOverflow> {
        // The retained tail holds no newline, so only new bytes need scanning.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + pos;
            if end - consumed > self.config.max_line_bytes {
                return Err(self.overflow(frames, end - consumed));
            }
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            self.handle_line(&line, &mut frames);
            consumed = end + 1;
            search_from = consumed;
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.config.max_line_bytes {
            let buffered = self.buffer.len();
            return Err(self.overflow(frames, buffered));
        }

        Ok(frames)
    }

    fn overflow(&mut self, frames: Vec<Frame>, line_bytes: usize) -> LineOverflow {
        let limit = self.config.max_line_bytes;
        warn!(
            target: "decoder",
            limit,
            line_bytes,
            completed = frames.len(),
            "Line exceeded limit; discarding buffer"
        );
        self.buffer.clear();
        self.pending_kind = None;
        LineOverflow { frames, limit }
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<Frame>) {
        self.stats.lines += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(kind) = field_value(line, EVENT_PREFIX) {
            let kind = kind.trim();
            self.pending_kind = (!kind.is_empty()).then(|| kind.to_string());
            return;
        }

        if let Some(data) = field_value(line, DATA_PREFIX) {
            let kind = self
                .pending_kind
                .take()
                .or_else(|| self.config.default_kind.clone());
            let Some(kind) = kind else {
                self.stats.orphaned += 1;
                debug!(target: "decoder", "Dropping payload line without a pending kind");
                return;
            };

            if serde_json::from_str::<IgnoredAny>(data).is_err() {
                self.stats.malformed += 1;
                debug!(target: "decoder", kind = %kind, "Dropping malformed payload line");
                return;
            }

            let frame = Frame::new(kind, data, self.next_order);
            trace!(target: "decoder", kind = %frame.kind, order = frame.arrival_order, "Frame decoded");
            self.next_order += 1;
            self.stats.frames += 1;
            frames.push(frame);
            return;
        }

        if !line.is_empty() {
            self.stats.ignored += 1;
        }
    }

    /// Number of buffered bytes belonging to an unterminated line
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Kind recorded by the last type line not yet paired with a payload
    pub fn pending_kind(&self) -> Option<&str> {
        self.pending_kind.as_deref()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Forget the partial line and pending kind. Arrival numbering continues.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_kind = None;
    }
}

/// Value of a `name:` field, with at most one leading space removed
fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}
