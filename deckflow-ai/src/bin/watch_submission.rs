//! deckflow-watch - follow a submission until its analysis finishes
//!
//! Subscribes to the service's SSE stream and polls the status endpoint as a
//! fallback, printing each status change. Exits 0 on `completed`, 1 on
//! `failed` and 2 when the poll ceiling is reached first.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use deckflow_common::config::LoggingConfig;
use deckflow_common::watcher::{
    sse_event_stream, HttpStatusSource, StatusSource, StatusWatcher, WatchConfig, WatchOutcome,
};
use deckflow_common::AnalysisStatus;
use tracing::warn;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "deckflow-watch")]
#[command(about = "Watch a Deckflow submission until analysis finishes")]
#[command(version)]
struct Args {
    /// Submission to watch
    submission_id: Uuid,

    /// Base URL of the deckflow-ai service
    #[arg(short, long, default_value = "http://127.0.0.1:5780", env = "DECKFLOW_URL")]
    url: String,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Give up after this many polls
    #[arg(long, default_value = "300")]
    max_attempts: u32,

    /// Poll only, without the SSE stream
    #[arg(long)]
    no_push: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    deckflow_common::config::init_logging(&LoggingConfig {
        level: "warn".to_string(),
        file: None,
    })
    .context("Failed to initialize logging")?;

    let source: Arc<dyn StatusSource> =
        Arc::new(HttpStatusSource::new(args.url.as_str()).context("Failed to build HTTP client")?);

    let initial = source
        .fetch_status(args.submission_id)
        .await
        .context("Failed to query submission status")?
        .with_context(|| format!("Submission {} not found", args.submission_id))?;
    println!("{}  {}", args.submission_id, initial.status);

    if initial.status.is_terminal() {
        return Ok(exit_code(initial.status));
    }

    let push = if args.no_push {
        None
    } else {
        match sse_event_stream(&args.url).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Event stream unavailable, polling only");
                None
            }
        }
    };

    let config = WatchConfig {
        poll_interval: Duration::from_millis(args.interval_ms.max(50)),
        max_attempts: args.max_attempts.max(1),
    };

    let watcher = StatusWatcher::spawn(
        args.submission_id,
        Some(initial.status),
        config,
        source,
        push,
        |update| {
            let mut line = format!("{}  {}", update.submission_id, update.status);
            if let Some(name) = &update.company_name {
                line.push_str(&format!("  company={}", name));
            }
            if let Some(id) = update.company_id {
                line.push_str(&format!("  id={}", id));
            }
            if let Some(error) = &update.error {
                line.push_str(&format!("  error={}", error));
            }
            println!("{}", line);
        },
    );

    let code = match watcher.wait().await {
        WatchOutcome::Terminal(update) => exit_code(update.status),
        WatchOutcome::Exhausted { attempts } => {
            eprintln!("No final status after {} polls", attempts);
            ExitCode::from(2)
        }
        WatchOutcome::Stopped => ExitCode::from(2),
    };
    Ok(code)
}

fn exit_code(status: AnalysisStatus) -> ExitCode {
    match status {
        AnalysisStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    }
}
