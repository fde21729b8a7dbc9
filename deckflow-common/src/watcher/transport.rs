//! Transports feeding the status watcher
//!
//! - Poll: a [`StatusSource`] answering "what is the status now?"
//! - Push: a stream of [`DeckEvent`]s, either from the in-process
//!   [`EventBus`] or from the service's SSE endpoint

use crate::api::StatusSnapshot;
use crate::events::{DeckEvent, EventBus};
use crate::sse::SseDecoder;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Boxed push stream consumed by the watcher
pub type EventStream = BoxStream<'static, DeckEvent>;

/// Poll-path status lookup
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current status, or `None` if the submission does not exist
    async fn fetch_status(&self, submission_id: Uuid) -> Result<Option<StatusSnapshot>>;
}

/// Status lookup against `GET {base_url}/submissions/{id}/status`
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_status(&self, submission_id: Uuid) -> Result<Option<StatusSnapshot>> {
        let url = format!("{}/submissions/{}/status", self.base_url, submission_id);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Http(format!("GET {} returned {}", url, resp.status())));
        }

        Ok(Some(resp.json::<StatusSnapshot>().await?))
    }
}

/// Push stream from the in-process event bus
///
/// Lagged receivers keep going; anything they missed is recovered by the
/// poll path.
pub fn bus_event_stream(event_bus: &EventBus) -> EventStream {
    let mut rx = event_bus.subscribe();

    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status watcher lagged behind event bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    .boxed()
}

/// Push stream from the service's SSE endpoint (`GET {base_url}/events`)
///
/// The returned stream ends when the connection drops; it is not
/// reconnected.
pub async fn sse_event_stream(base_url: &str) -> Result<EventStream> {
    let url = format!("{}/events", base_url.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(Error::Http(format!("GET {} returned {}", url, resp.status())));
    }

    let mut body = resp.bytes_stream();
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.push(&bytes) {
                        yield event;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "SSE connection closed");
                    break;
                }
            }
        }
    };

    Ok(stream.boxed())
}
