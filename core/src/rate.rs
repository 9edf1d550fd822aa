//! Rate engine: cumulative counter snapshots in, per-second derived points out.
//!
//! The first snapshot of a session only establishes a baseline. Every later
//! snapshot is compared against the one before it; non-positive time deltas
//! produce nothing but still move the baseline forward.

use crate::frame::Frame;
use crate::ring_buffer::DEFAULT_CAPACITY;
use crate::{Result, RillError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Suffix appended to a counter name to name its rate
pub const RATE_SUFFIX: &str = "_rate";
/// Field of a snapshot object that signals a producer-side failure
pub const ERROR_FIELD: &str = "error";

/// Timestamped set of cumulative counters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Seconds
    pub timestamp: f64,
    pub counters: BTreeMap<String, f64>,
}

impl CounterSnapshot {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            counters: BTreeMap::new(),
        }
    }

    /// Builder-style counter insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.counters.get(name).copied()
    }

    /// Parse a flat JSON object of counters.
    ///
    /// The timestamp may be a number of seconds or an RFC 3339 string.
    /// Non-numeric fields are skipped. An object carrying an `error` field
    /// is a producer failure, not a snapshot.
    pub fn from_json(value: &Value, timestamp_field: &str) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RillError::InvalidSnapshot("expected a JSON object".into()))?;

        if let Some(err) = obj.get(ERROR_FIELD).filter(|v| !v.is_null()) {
            let message = match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(RillError::Producer(message));
        }

        let timestamp = obj
            .get(timestamp_field)
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                RillError::InvalidSnapshot(format!("missing or invalid '{timestamp_field}'"))
            })?;

        let counters = obj
            .iter()
            .filter(|(k, _)| k.as_str() != timestamp_field)
            .filter_map(|(k, v)| numeric(v).map(|n| (k.clone(), n)))
            .collect();

        Ok(Self {
            timestamp,
            counters,
        })
    }

    /// Parse the payload of a decoded frame
    pub fn from_frame(frame: &Frame, timestamp_field: &str) -> Result<Self> {
        Self::from_json(&frame.value()?, timestamp_field)
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        // bigint counters are often serialized as strings
        Value::String(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn parse_timestamp(v: &Value) -> Option<f64> {
    if let Some(n) = numeric(v) {
        return Some(n);
    }
    let s = v.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}

/// Rate/ratio sample computed from two adjacent snapshots
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedPoint {
    /// Timestamp of the later snapshot
    pub timestamp: f64,
    pub rates: BTreeMap<String, f64>,
}

impl DerivedPoint {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.rates.get(name).copied()
    }
}

/// Percentage metric computed from the deltas of two counters:
/// `hit / (hit + read) * 100`, or 100 when neither moved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioMetric {
    pub name: String,
    pub hit: String,
    pub read: String,
}

impl RatioMetric {
    pub fn new(name: impl Into<String>, hit: impl Into<String>, read: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hit: hit.into(),
            read: read.into(),
        }
    }

    /// Buffer cache hit percentage
    pub fn cache_hit_pct() -> Self {
        Self::new("cache_hit_pct", "blks_hit", "blks_read")
    }

    fn compute(&self, prev: &CounterSnapshot, curr: &CounterSnapshot) -> Option<f64> {
        let hit = curr.get(&self.hit)? - prev.get(&self.hit)?;
        let read = curr.get(&self.read)? - prev.get(&self.read)?;
        let total = hit + read;
        // An idle interval reads as fully cached.
        Some(if total > 0.0 { hit / total * 100.0 } else { 100.0 })
    }
}

/// Rate engine and metrics history configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub ratios: Vec<RatioMetric>,
    /// Counters reported as their current value instead of a rate
    pub gauges: Vec<String>,
    /// Snapshot field holding the timestamp
    pub timestamp_field: String,
    /// Number of derived points kept per session
    pub history_capacity: usize,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            ratios: vec![RatioMetric::cache_hit_pct()],
            gauges: vec![
                "active_connections".to_string(),
                "waiting_connections".to_string(),
            ],
            timestamp_field: std::env::var("RILL_TIMESTAMP_FIELD")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "timestamp".to_string()),
            history_capacity: std::env::var("RILL_HISTORY_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_CAPACITY),
        }
    }
}

/// Converts consecutive snapshots into derived points.
#[derive(Debug, Default)]
pub struct RateEngine {
    config: RateConfig,
    prev: Option<CounterSnapshot>,
    observed: u64,
    degenerate: u64,
}

impl RateEngine {
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            prev: None,
            observed: 0,
            degenerate: 0,
        }
    }

    /// Observe the next snapshot in arrival order.
    ///
    /// Returns `None` for the first snapshot (warm-up) and whenever the time
    /// delta is not positive. A counter that regresses yields a negative
    /// rate; that is a discontinuity signal and is passed through.
    pub fn observe(&mut self, snapshot: CounterSnapshot) -> Option<DerivedPoint> {
        self.observed += 1;

        let Some(prev) = self.prev.take() else {
            trace!(target: "rate", timestamp = snapshot.timestamp, "Baseline snapshot stored");
            self.prev = Some(snapshot);
            return None;
        };

        let dt = snapshot.timestamp - prev.timestamp;
        if dt <= 0.0 || dt.is_nan() {
            self.degenerate += 1;
            debug!(
                target: "rate",
                prev = prev.timestamp,
                curr = snapshot.timestamp,
                "Non-positive time delta; replacing baseline"
            );
            self.prev = Some(snapshot);
            return None;
        }

        let point = self.derive(&prev, &snapshot, dt);
        self.prev = Some(snapshot);
        Some(point)
    }

    fn derive(&self, prev: &CounterSnapshot, curr: &CounterSnapshot, dt: f64) -> DerivedPoint {
        let mut rates = BTreeMap::new();

        for (name, value) in &curr.counters {
            if self.config.gauges.iter().any(|g| g == name) {
                rates.insert(name.clone(), *value);
                continue;
            }
            if let Some(before) = prev.get(name) {
                rates.insert(format!("{name}{RATE_SUFFIX}"), (value - before) / dt);
            }
        }

        for ratio in &self.config.ratios {
            if let Some(pct) = ratio.compute(prev, curr) {
                rates.insert(ratio.name.clone(), pct);
            }
        }

        DerivedPoint {
            timestamp: curr.timestamp,
            rates,
        }
    }

    /// Current baseline snapshot
    pub fn baseline(&self) -> Option<&CounterSnapshot> {
        self.prev.as_ref()
    }

    /// Snapshots observed so far
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Snapshots discarded for a non-positive time delta
    pub fn degenerate(&self) -> u64 {
        self.degenerate
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Drop the baseline so the next snapshot warms up again
    pub fn reset(&mut self) {
        self.prev = None;
    }
}
