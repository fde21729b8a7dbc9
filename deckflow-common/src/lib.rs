//! # Deckflow Common Library
//!
//! Shared code for the Deckflow analysis service and its clients:
//! - Error type
//! - Configuration loading and logging setup
//! - Database schema initialization
//! - Event types (DeckEvent enum) and EventBus
//! - API request/response types and bearer-token auth helpers
//! - SSE encoding/decoding
//! - Submission status watcher (push + poll)

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod watcher;

pub use api::AnalysisStatus;
pub use error::{Error, Result};
