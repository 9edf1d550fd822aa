// Metrics reducer for counter telemetry streams
use serde::Serialize;
use tracing::{debug, trace};

use super::{error_message, Fold, Reducer};
use crate::frame::Frame;
use crate::rate::{CounterSnapshot, DerivedPoint, RateConfig, RateEngine};
use crate::ring_buffer::RingBuffer;
use crate::RillError;

/// Derived history of one metrics session
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsState {
    pub history: RingBuffer<DerivedPoint>,
    /// Most recent raw snapshot, including the warm-up one
    pub latest: Option<CounterSnapshot>,
    /// First producer-reported error
    pub error: Option<String>,
}

impl MetricsState {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RingBuffer::new(capacity),
            latest: None,
            error: None,
        }
    }
}

/// Parses every frame as a counter snapshot and feeds the rate engine
#[derive(Debug)]
pub struct MetricsReducer {
    engine: RateEngine,
}

impl Default for MetricsReducer {
    fn default() -> Self {
        Self::new(RateConfig::default())
    }
}

impl MetricsReducer {
    pub fn new(config: RateConfig) -> Self {
        Self {
            engine: RateEngine::new(config),
        }
    }

    pub fn engine(&self) -> &RateEngine {
        &self.engine
    }

    fn producer_error(state: &mut MetricsState, message: String) -> Fold {
        if state.error.is_none() {
            state.error = Some(message.clone());
        }
        Fold::ProducerError(message)
    }
}

impl Reducer for MetricsReducer {
    type State = MetricsState;

    fn initial_state(&self) -> MetricsState {
        MetricsState::new(self.engine.config().history_capacity)
    }

    fn fold(&mut self, state: &mut MetricsState, frame: &Frame) -> Fold {
        let Ok(value) = frame.value() else {
            return Fold::Skipped;
        };

        if frame.is_kind("error") {
            return Self::producer_error(state, error_message(&value));
        }

        let timestamp_field = &self.engine.config().timestamp_field;
        let snapshot = match CounterSnapshot::from_json(&value, timestamp_field) {
            Ok(s) => s,
            Err(RillError::Producer(message)) => return Self::producer_error(state, message),
            Err(e) => {
                debug!(target: "reducer", order = frame.arrival_order, error = %e, "Skipping counter frame");
                return Fold::Skipped;
            }
        };

        state.latest = Some(snapshot.clone());
        if let Some(point) = self.engine.observe(snapshot) {
            trace!(target: "reducer", timestamp = point.timestamp, "Derived point appended");
            state.history.push(point);
        }
        Fold::Applied
    }
}
