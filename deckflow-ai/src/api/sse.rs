//! Server-Sent Events for submission status and notifications

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use deckflow_common::sse::event_bus_sse_stream;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only forward events about this submission (bulk events still pass)
    #[serde(default)]
    pub submission_id: Option<Uuid>,
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_bus_sse_stream(&state.event_bus, move |event| match filter.submission_id {
        Some(wanted) => event.submission_id().map_or(true, |id| id == wanted),
        None => true,
    })
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
