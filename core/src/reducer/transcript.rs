// Transcript reducer for agent execution streams
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{error_message, Fold, Reducer};
use crate::frame::Frame;

/// Growing output text plus an ordered event log
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub events: Vec<TranscriptEvent>,
    /// First producer-reported error; never overwritten
    pub error: Option<String>,
}

/// Structured entry of the event log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub kind: String,
    pub arrival_order: u64,
    pub payload: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Token,
    Event,
    Error,
    Other,
}

fn role(kind: &str) -> Role {
    match kind {
        "token" | "text_delta" => Role::Token,
        "start" | "step" | "complete" | "done" | "tool_call" | "tool_result" => Role::Event,
        "error" => Role::Error,
        _ => Role::Other,
    }
}

/// Event serialized with its variant name as the only key, as an agent
/// runtime emits on `data:`-only streams: `{"TextDelta":{"text":"hi"}}`.
/// Returns the role, the event kind recorded in the log and the inner payload.
fn tagged_event(value: &Value) -> Option<(Role, &'static str, &Value)> {
    let obj = value.as_object().filter(|obj| obj.len() == 1)?;
    let (tag, inner) = obj.iter().next()?;
    let (role, kind) = match tag.as_str() {
        "TextDelta" => (Role::Token, "text_delta"),
        "ToolCallStart" => (Role::Event, "tool_call"),
        "ToolExecutionStart" => (Role::Event, "tool_execution"),
        "ToolExecutionResult" => (Role::Event, "tool_result"),
        "MessageEnd" => (Role::Event, "done"),
        "Error" => (Role::Error, "error"),
        // Argument fragments and call ends carry nothing for the transcript
        _ => return None,
    };
    Some((role, kind, inner))
}

/// Token text from a bare JSON string or an object with a text-like field
fn token_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => ["token", "text", "content", "delta"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str)),
        _ => None,
    }
}

/// Folds token frames into text and lifecycle frames into an event log
#[derive(Debug, Default, Clone)]
pub struct TranscriptReducer;

impl TranscriptReducer {
    pub fn new() -> Self {
        Self
    }
}

impl Reducer for TranscriptReducer {
    type State = Transcript;

    fn initial_state(&self) -> Transcript {
        Transcript::default()
    }

    fn fold(&mut self, state: &mut Transcript, frame: &Frame) -> Fold {
        let Ok(value) = frame.value() else {
            return Fold::Skipped;
        };

        let (role, kind, payload) = match role(&frame.kind) {
            Role::Other => match tagged_event(&value) {
                Some((role, kind, inner)) => (role, kind.to_string(), inner.clone()),
                None => {
                    trace!(target: "reducer", kind = %frame.kind, "Ignoring frame kind");
                    return Fold::Skipped;
                }
            },
            role => (role, frame.kind.clone(), value),
        };

        match role {
            Role::Token => match token_text(&payload) {
                Some(text) => {
                    state.text.push_str(text);
                    Fold::Applied
                }
                None => {
                    debug!(target: "reducer", order = frame.arrival_order, "Token frame without text");
                    Fold::Skipped
                }
            },
            Role::Event => {
                state.events.push(TranscriptEvent {
                    kind,
                    arrival_order: frame.arrival_order,
                    payload,
                });
                Fold::Applied
            }
            Role::Error => {
                let message = error_message(&payload);
                if state.error.is_none() {
                    state.error = Some(message.clone());
                }
                Fold::ProducerError(message)
            }
            Role::Other => Fold::Skipped,
        }
    }
}
