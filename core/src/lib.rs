// Rill Core Library
// Incremental stream decoding and derived-metrics runtime

pub mod config;
pub mod decoder;
pub mod frame;
pub mod rate;
pub mod reducer;
pub mod ring_buffer;
pub mod session;
pub mod source;
pub mod telemetry;

// Export core types
pub use config::{HttpConfig, RillConfig};
pub use decoder::{DecoderConfig, DecoderStats, FrameDecoder, LineOverflow};
pub use frame::Frame;
pub use rate::{CounterSnapshot, DerivedPoint, RateConfig, RateEngine, RatioMetric};
pub use reducer::{
    Fold, MetricsReducer, MetricsState, Reducer, Transcript, TranscriptEvent, TranscriptReducer,
};
pub use ring_buffer::RingBuffer;
pub use session::{
    ControllerConfig, SessionController, SessionHandle, SessionState, SessionStats,
};
pub use source::{ChannelSource, ChunkSender, ChunkSource, HttpSource, StreamSource};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RillError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Line exceeded {limit} bytes without a terminating newline")]
    LineTooLong { limit: usize },

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, RillError>;
