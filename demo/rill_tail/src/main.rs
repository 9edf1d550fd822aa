mod config;
use clap::{Parser, Subcommand};
use config::TailConfig;
use rill_core::{
    HttpSource, MetricsReducer, SessionController, SessionHandle, SessionState, Transcript,
    TranscriptReducer,
};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tail a streaming endpoint: decode its frames and print the reduced view
#[derive(Parser, Debug)]
#[command(name = "rill-tail", version)]
struct Args {
    /// Base URL of the producer (overrides config file)
    #[arg(long, env = "RILL_BASE_URL")]
    base_url: Option<String>,

    /// Cancel the session after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Terminal refresh interval in milliseconds (overrides config file)
    #[arg(long)]
    refresh_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an agent execution stream as text plus lifecycle events
    Transcript {
        /// Stream path, e.g. /api/agents/analyst/execute
        path: String,
        /// JSON request body; sends a POST instead of a GET
        #[arg(long)]
        body: Option<String>,
    },
    /// Print derived rates from a counter snapshot stream
    Metrics {
        /// Stream path, e.g. /api/metrics/stream
        path: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = rill_core::telemetry::init_logging(rill_core::telemetry::DEFAULT_FILTER) {
        eprintln!("failed to initialize logging: {e}");
    }

    let code = match run(Args::parse()).await {
        Ok(SessionState::Completed) => 0,
        Ok(SessionState::Cancelled) => 130,
        Ok(_) => 1,
        Err(e) => {
            error!(target: "rill_tail", error = %e, "rill-tail failed");
            2
        }
    };

    // Leave without waiting on the blocking stdin reader
    std::process::exit(code);
}

async fn run(args: Args) -> Result<SessionState, BoxError> {
    let mut cfg = TailConfig::load();
    if let Some(url) = args.base_url {
        cfg.rill.http.base_url = url;
    }
    if let Some(ms) = args.refresh_ms {
        cfg.refresh_ms = ms;
    }
    cfg.rill.validate()?;

    let client = cfg.rill.http.client()?;
    let deadline = args.timeout_secs.map(Duration::from_secs);
    info!(
        target: "rill_tail",
        base_url = %cfg.rill.http.base_url,
        "Starting rill-tail; type p to pause, r to resume, q to stop"
    );

    match args.command {
        Command::Transcript { path, body } => {
            let source = match body {
                Some(raw) => {
                    let body: serde_json::Value = serde_json::from_str(&raw)?;
                    HttpSource::post_json(&client, &cfg.rill.http, &path, &body)
                }
                None => HttpSource::get(&client, &cfg.rill.http, &path),
            };
            let mut controller: SessionController<TranscriptReducer> =
                SessionController::new(cfg.rill.controller.clone());
            let handle = controller.start(source, TranscriptReducer::new());
            attach_controls(&handle, deadline);

            let mut view = TranscriptView::default();
            let state = follow(&handle, cfg.refresh(), |t| view.render(t)).await;
            println!();
            Ok(report(&handle, state))
        }
        Command::Metrics { path } => {
            let mut controller: SessionController<MetricsReducer> =
                SessionController::new(cfg.rill.controller.clone());
            let source = HttpSource::get(&client, &cfg.rill.http, &path);
            let handle = controller.start(source, MetricsReducer::new(cfg.rill.rate.clone()));
            attach_controls(&handle, deadline);

            let mut last_ts = f64::NEG_INFINITY;
            let state = follow(&handle, cfg.refresh(), |m| {
                let seen = last_ts;
                for point in m.history.iter().filter(|p| p.timestamp > seen) {
                    let fields: Vec<String> = point
                        .rates
                        .iter()
                        .map(|(k, v)| format!("{k}={v:.2}"))
                        .collect();
                    println!("t={:.3} {}", point.timestamp, fields.join(" "));
                    last_ts = point.timestamp;
                }
            })
            .await;
            Ok(report(&handle, state))
        }
    }
}

/// Ctrl-C, the optional deadline and stdin commands all act on `handle`
fn attach_controls<S: Send + Sync + 'static>(handle: &SessionHandle<S>, deadline: Option<Duration>) {
    if let Some(deadline) = deadline {
        handle.cancel_after(deadline);
    }

    let h = handle.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!(target: "rill_tail", "Ctrl-C received, cancelling");
                h.cancel();
            }
            _ = h.wait() => {}
        }
    });

    let h = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "p" => h.pause(),
                "r" => h.resume(),
                "q" => {
                    h.cancel();
                    break;
                }
                "" => {}
                other => warn!(target: "rill_tail", input = %other, "Unknown command (p, r, q)"),
            }
        }
    });
}

/// Render the reducer state every `refresh` until the session ends.
///
/// Returns immediately after one render if the session already ended.
async fn follow<S, F>(handle: &SessionHandle<S>, refresh: Duration, mut render: F) -> SessionState
where
    S: Send + Sync + 'static,
    F: FnMut(&S),
{
    let mut ticker = tokio::time::interval(refresh);
    // `wait` checks the current state first, so an early end is never missed
    let finished = handle.wait();
    tokio::pin!(finished);
    loop {
        tokio::select! {
            state = &mut finished => {
                handle.read(&mut render).await;
                return state;
            }
            _ = ticker.tick() => {
                handle.read(&mut render).await;
            }
        }
    }
}

/// Incremental terminal view of a transcript
#[derive(Default)]
struct TranscriptView {
    printed_text: usize,
    printed_events: usize,
}

impl TranscriptView {
    fn render(&mut self, t: &Transcript) {
        let mut out = std::io::stdout().lock();
        for event in &t.events[self.printed_events..] {
            let _ = writeln!(out, "\n[{}] {}", event.kind, event.payload);
        }
        self.printed_events = t.events.len();

        if let Some(new_text) = t.text.get(self.printed_text..) {
            let _ = write!(out, "{new_text}");
        }
        self.printed_text = t.text.len();
        let _ = out.flush();
    }
}

fn report<S: Send + Sync + 'static>(handle: &SessionHandle<S>, state: SessionState) -> SessionState {
    let stats = handle.stats();
    info!(
        target: "rill_tail",
        id = %handle.id(),
        state = %state,
        chunks = stats.chunks,
        bytes = stats.bytes,
        frames = stats.frames_decoded,
        applied = stats.frames_applied,
        dropped_paused = stats.frames_dropped_paused,
        malformed = stats.lines_malformed,
        "Session ended"
    );
    if let Some(err) = handle.error() {
        error!(target: "rill_tail", id = %handle.id(), error = %err, "Session errored");
    }
    state
}
