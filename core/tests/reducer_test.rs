//! Frame Reducer Tests
//!
//! - TranscriptReducer: token text, event log, first-writer-wins errors
//! - MetricsReducer: snapshots → RateEngine → RingBuffer history

use rill_core::{
    Fold, Frame, MetricsReducer, RateConfig, RatioMetric, Reducer, Transcript, TranscriptReducer,
};
use serde_json::json;

fn frame(order: u64, kind: &str, payload: serde_json::Value) -> Frame {
    Frame::new(kind, payload.to_string(), order)
}

fn fold_all<R: Reducer>(reducer: &mut R, frames: &[Frame]) -> (R::State, Vec<Fold>) {
    let mut state = reducer.initial_state();
    let outcomes = frames.iter().map(|f| reducer.fold(&mut state, f)).collect();
    (state, outcomes)
}

fn rate_config(capacity: usize) -> RateConfig {
    RateConfig {
        ratios: vec![RatioMetric::cache_hit_pct()],
        gauges: vec!["active_connections".into(), "waiting_connections".into()],
        timestamp_field: "t".into(),
        history_capacity: capacity,
    }
}

// =============================================================================
// TranscriptReducer
// =============================================================================

#[test]
fn transcript_appends_tokens_and_logs_events() {
    let mut reducer = TranscriptReducer::new();
    let frames = vec![
        frame(0, "start", json!({"agent": "analyst"})),
        frame(1, "token", json!({"token": "Hello"})),
        frame(2, "step", json!({"step": 1})),
        frame(3, "token", json!(", world")),
        frame(4, "complete", json!({"status": "success"})),
    ];

    let (state, outcomes) = fold_all(&mut reducer, &frames);

    assert!(outcomes.iter().all(|o| *o == Fold::Applied));
    assert_eq!(state.text, "Hello, world");
    let kinds: Vec<&str> = state.events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["start", "step", "complete"]);
    assert_eq!(state.events[1].arrival_order, 2);
    assert_eq!(state.events[1].payload, json!({"step": 1}));
    assert_eq!(state.error, None);
}

#[test]
fn transcript_accepts_agent_stream_vocabulary() {
    let mut reducer = TranscriptReducer::new();
    let frames = vec![
        frame(0, "text_delta", json!({"text": "Looking"})),
        frame(1, "tool_call", json!({"id": "t1", "name": "graph_query"})),
        frame(2, "tool_result", json!({"id": "t1", "content": "3 rows"})),
        frame(3, "text_delta", json!({"text": " done"})),
        frame(4, "done", json!({})),
    ];

    let (state, _) = fold_all(&mut reducer, &frames);
    assert_eq!(state.text, "Looking done");
    assert_eq!(state.events.len(), 3);
}

#[test]
fn transcript_reads_variant_tagged_agent_events() {
    let mut reducer = TranscriptReducer::new();
    let frames = vec![
        frame(0, "message", json!({"TextDelta": {"text": "Checking"}})),
        frame(1, "message", json!({"ToolCallStart": {"id": "t1", "name": "graph_query"}})),
        frame(2, "message", json!({"ToolCallDelta": {"id": "t1", "arguments_delta": "{\"q\""}})),
        frame(3, "message", json!({"ToolExecutionResult": {"id": "t1", "content": "3 rows", "is_error": false}})),
        frame(4, "message", json!({"TextDelta": {"text": " the graph"}})),
        frame(5, "message", json!({"MessageEnd": {"stop_reason": "EndTurn"}})),
        frame(6, "message", json!({"Error": {"message": "quota exceeded"}})),
    ];

    let (state, outcomes) = fold_all(&mut reducer, &frames);

    assert_eq!(state.text, "Checking the graph");
    let kinds: Vec<&str> = state.events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["tool_call", "tool_result", "done"]);
    assert_eq!(state.events[0].payload, json!({"id": "t1", "name": "graph_query"}));
    assert_eq!(state.events[1].arrival_order, 3);
    assert_eq!(outcomes[2], Fold::Skipped);
    assert_eq!(outcomes[6], Fold::ProducerError("quota exceeded".into()));
    assert_eq!(state.error.as_deref(), Some("quota exceeded"));
}

#[test]
fn transcript_first_error_wins() {
    let mut reducer = TranscriptReducer::new();
    let frames = vec![
        frame(0, "token", json!("partial")),
        frame(1, "error", json!({"error": {"message": "rate limited"}})),
        frame(2, "token", json!(" more")),
        frame(3, "error", json!("second failure")),
    ];

    let (state, outcomes) = fold_all(&mut reducer, &frames);

    assert_eq!(state.error.as_deref(), Some("rate limited"));
    assert_eq!(state.text, "partial more");
    assert_eq!(outcomes[1], Fold::ProducerError("rate limited".into()));
    assert_eq!(outcomes[3], Fold::ProducerError("second failure".into()));
}

#[test]
fn transcript_skips_unknown_and_textless_frames() {
    let mut reducer = TranscriptReducer::new();
    let frames = vec![
        frame(0, "ping", json!({})),
        frame(1, "token", json!({"count": 3})),
        frame(2, "token", json!(17)),
    ];

    let (state, outcomes) = fold_all(&mut reducer, &frames);
    assert!(outcomes.iter().all(|o| *o == Fold::Skipped));
    assert_eq!(state, Transcript::default());
}

// =============================================================================
// MetricsReducer
// =============================================================================

#[test]
fn metrics_first_snapshot_warms_up() {
    let mut reducer = MetricsReducer::new(rate_config(60));
    let (state, outcomes) = fold_all(
        &mut reducer,
        &[frame(0, "snapshot", json!({"t": 0, "tps": 100}))],
    );

    assert_eq!(outcomes, vec![Fold::Applied]);
    assert!(state.history.is_empty());
    assert_eq!(state.latest.as_ref().map(|s| s.timestamp), Some(0.0));
}

#[test]
fn metrics_derives_rates_and_cache_hit_pct() {
    let mut reducer = MetricsReducer::new(rate_config(60));
    let frames = vec![
        frame(0, "snapshot", json!({"t": 0, "tps": 100, "blks_hit": 500, "blks_read": 50})),
        frame(1, "snapshot", json!({"t": 2, "tps": 110, "blks_hit": 540, "blks_read": 52})),
    ];

    let (state, _) = fold_all(&mut reducer, &frames);

    assert_eq!(state.history.len(), 1);
    let point = state.history.latest().unwrap();
    assert_eq!(point.get("tps_rate"), Some(5.0));
    let pct = point.get("cache_hit_pct").unwrap();
    assert!((pct - 95.238).abs() < 0.001, "cache_hit_pct = {}", pct);
}

#[test]
fn metrics_history_is_bounded() {
    let capacity = 5;
    let mut reducer = MetricsReducer::new(rate_config(capacity));
    let frames: Vec<Frame> = (0..12)
        .map(|i| frame(i, "snapshot", json!({"t": i * 2, "xact_commit": i * 10})))
        .collect();

    let (state, _) = fold_all(&mut reducer, &frames);

    // 12 snapshots → 11 points, only the last 5 retained oldest-first
    assert_eq!(state.history.len(), capacity);
    let timestamps: Vec<f64> = state.history.iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![14.0, 16.0, 18.0, 20.0, 22.0]);
    assert!(state
        .history
        .iter()
        .all(|p| p.get("xact_commit_rate") == Some(5.0)));
}

#[test]
fn metrics_invalid_snapshot_leaves_state_untouched() {
    let mut reducer = MetricsReducer::new(rate_config(60));
    let mut state = reducer.initial_state();

    reducer.fold(&mut state, &frame(0, "snapshot", json!({"t": 0, "tps": 1})));
    let before = state.clone();

    assert_eq!(
        reducer.fold(&mut state, &frame(1, "snapshot", json!({"tps": 2}))),
        Fold::Skipped
    );
    assert_eq!(
        reducer.fold(&mut state, &frame(2, "snapshot", json!([1, 2, 3]))),
        Fold::Skipped
    );
    assert_eq!(state, before);

    // Baseline still t=0
    reducer.fold(&mut state, &frame(3, "snapshot", json!({"t": 1, "tps": 4})));
    assert_eq!(state.history.latest().unwrap().get("tps_rate"), Some(3.0));
}

#[test]
fn metrics_error_field_is_producer_error() {
    let mut reducer = MetricsReducer::new(rate_config(60));
    let frames = vec![
        frame(0, "snapshot", json!({"error": "permission denied for pg_stat_database"})),
        frame(1, "error", json!({"message": "backend restarting"})),
    ];

    let (state, outcomes) = fold_all(&mut reducer, &frames);

    assert_eq!(
        outcomes[0],
        Fold::ProducerError("permission denied for pg_stat_database".into())
    );
    assert_eq!(outcomes[1], Fold::ProducerError("backend restarting".into()));
    assert_eq!(
        state.error.as_deref(),
        Some("permission denied for pg_stat_database")
    );
    assert!(state.history.is_empty());
}
