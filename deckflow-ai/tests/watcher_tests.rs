//! Status watcher against a live pipeline
//!
//! The poll path reads the store directly or goes over HTTP; the push path
//! comes from the event bus or the SSE endpoint.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deckflow_ai::services::StoreStatusSource;
use deckflow_common::events::DeckEvent;
use deckflow_common::watcher::{
    bus_event_stream, sse_event_stream, Channel, HttpStatusSource, StatusSource, StatusWatcher,
    WatchConfig, WatchOutcome,
};
use deckflow_common::AnalysisStatus;
use futures::StreamExt;
use helpers::{harness, result, Script};

fn poll_config(interval_ms: u64) -> WatchConfig {
    WatchConfig {
        poll_interval: Duration::from_millis(interval_ms),
        max_attempts: 400,
    }
}

#[tokio::test]
async fn test_poll_only_watch_sees_completion() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    h.extractor
        .push(Script::Respond(result("Polled Inc", 3.8, None)));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let watcher = StatusWatcher::spawn(
        submission.id,
        Some(AnalysisStatus::Pending),
        poll_config(10),
        Arc::new(StoreStatusSource::new(h.db().clone())),
        None,
        move |update| sink.lock().unwrap().push(update.status),
    );

    h.state.router.trigger(submission.id).await.unwrap();

    match watcher.wait().await {
        WatchOutcome::Terminal(update) => {
            assert_eq!(update.status, AnalysisStatus::Completed);
            assert_eq!(update.channel, Channel::Poll);
            assert_eq!(update.company_name.as_deref(), Some("Polled Inc"));
            assert!(update.company_id.is_some());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&AnalysisStatus::Completed));
    assert!(!seen.contains(&AnalysisStatus::Pending));
}

#[tokio::test]
async fn test_push_watch_sees_failure() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;
    h.extractor.push(Script::Fail("quota exceeded".to_string()));

    // Slow polling so the bus delivers first
    let watcher = StatusWatcher::spawn(
        submission.id,
        Some(AnalysisStatus::Pending),
        WatchConfig {
            poll_interval: Duration::from_secs(30),
            max_attempts: 10,
        },
        Arc::new(StoreStatusSource::new(h.db().clone())),
        Some(bus_event_stream(&h.state.event_bus)),
        |_| {},
    );
    // Let the immediate first poll finish before anything changes
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.state.router.trigger(submission.id).await.unwrap();

    match watcher.wait().await {
        WatchOutcome::Terminal(update) => {
            assert_eq!(update.status, AnalysisStatus::Failed);
            assert_eq!(update.channel, Channel::Push);
            assert!(update.error.unwrap().contains("quota exceeded"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_closed_push_falls_back_to_polling() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;

    let watcher = StatusWatcher::spawn(
        submission.id,
        Some(AnalysisStatus::Pending),
        poll_config(20),
        Arc::new(StoreStatusSource::new(h.db().clone())),
        Some(futures::stream::empty::<DeckEvent>().boxed()),
        |_| {},
    );

    h.state.router.trigger(submission.id).await.unwrap();

    match watcher.wait().await {
        WatchOutcome::Terminal(update) => {
            assert_eq!(update.status, AnalysisStatus::Completed);
            assert_eq!(update.channel, Channel::Poll);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_http_watch_over_served_app() {
    let h = harness().await;
    let submission = h.seed_submission("xyz").await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let app = h.app();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let source = Arc::new(HttpStatusSource::new(base_url.as_str()).unwrap());
    let initial = source.fetch_status(submission.id).await.unwrap().unwrap();
    assert_eq!(initial.status, AnalysisStatus::Pending);
    assert!(source
        .fetch_status(uuid::Uuid::new_v4())
        .await
        .unwrap()
        .is_none());

    let push = sse_event_stream(&base_url).await.unwrap();
    let watcher = StatusWatcher::spawn(
        submission.id,
        Some(initial.status),
        poll_config(50),
        source,
        Some(push),
        |_| {},
    );

    h.state.router.trigger(submission.id).await.unwrap();

    match watcher.wait().await {
        WatchOutcome::Terminal(update) => {
            assert_eq!(update.status, AnalysisStatus::Completed);
            assert!(update.company_id.is_some());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
