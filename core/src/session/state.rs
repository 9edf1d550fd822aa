use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a decode session.
///
/// `Idle → Connecting → Streaming → {Completed | Errored | Cancelled}`.
/// `Idle` is only reported by a controller that has no session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }

    /// Connecting or streaming
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of one session's read loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub chunks: u64,
    pub bytes: u64,
    pub frames_decoded: u64,
    /// Frames the reducer applied, including producer errors
    pub frames_applied: u64,
    /// Frames the reducer could not interpret
    pub frames_skipped: u64,
    /// Frames discarded because the session was paused
    pub frames_dropped_paused: u64,
    /// Malformed payload lines dropped by the decoder
    pub lines_malformed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub chunks: AtomicU64,
    pub bytes: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_applied: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub frames_dropped_paused: AtomicU64,
    pub lines_malformed: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_dropped_paused: self.frames_dropped_paused.load(Ordering::Relaxed),
            lines_malformed: self.lines_malformed.load(Ordering::Relaxed),
        }
    }
}
