//! Server-Sent Events (SSE) utilities
//!
//! Encoding of [`DeckEvent`]s for SSE on the server side and a line-based
//! decoder for clients that consume the stream over HTTP.

use crate::events::{DeckEvent, EventBus};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Heartbeat period for every Deckflow SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// SSE stream forwarding every bus event accepted by `filter`
///
/// Lagged subscribers skip the lost events and keep streaming; clients are
/// expected to poll for state they might have missed.
pub fn event_bus_sse_stream<F>(
    event_bus: &EventBus,
    filter: F,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: Fn(&DeckEvent) -> bool + Send + 'static,
{
    info!("New SSE client connected to event stream");
    let mut rx = event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !filter(&event) {
                        continue;
                    }
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagged behind event bus");
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

/// Incremental decoder for `text/event-stream` bodies
///
/// Feed raw body chunks with [`SseDecoder::push`]; complete `DeckEvent` frames
/// are returned. Bytes are buffered until a full line arrives, so chunk
/// boundaries may fall inside a multi-byte character. Comments, heartbeats
/// and non-JSON frames are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<DeckEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    let payload = self.data.join("\n");
                    self.data.clear();
                    if let Ok(event) = serde_json::from_str::<DeckEvent>(&payload) {
                        events.push(event);
                    }
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.trim_start().to_string());
            }
            // `event:`, `id:`, `retry:` and `:comment` lines carry nothing we need
        }

        events
    }
}
