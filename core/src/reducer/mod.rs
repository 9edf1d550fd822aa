//! Frame reducers.
//!
//! A reducer folds decoded frames into the state a session exposes to its
//! readers. It is chosen when a session starts, so the decoder and the
//! session loop stay independent of any payload schema.

mod metrics;
mod transcript;

pub use metrics::{MetricsReducer, MetricsState};
pub use transcript::{Transcript, TranscriptEvent, TranscriptReducer};

use crate::frame::Frame;

/// Outcome of folding one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fold {
    /// State was updated
    Applied,
    /// Frame was not meaningful to this reducer; state is untouched
    Skipped,
    /// Frame carried a producer-reported error. The session keeps draining
    /// and ends `Errored` once the stream completes.
    ProducerError(String),
}

/// Fold over decoded frames.
///
/// `fold` must leave `state` untouched unless it returns `Applied` or
/// `ProducerError`; a frame it cannot interpret never partially updates
/// the state.
pub trait Reducer: Send + 'static {
    type State: Send + Sync + 'static;

    /// State of a fresh session
    fn initial_state(&self) -> Self::State;

    fn fold(&mut self, state: &mut Self::State, frame: &Frame) -> Fold;
}

/// Best-effort human-readable message from an error payload
pub(crate) fn error_message(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => match obj.get("error").or_else(|| obj.get("message")) {
            Some(Value::String(s)) => s.clone(),
            Some(inner @ Value::Object(_)) => error_message(inner),
            Some(other) => other.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}
