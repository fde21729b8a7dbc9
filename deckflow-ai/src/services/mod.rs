//! Service modules for the submission analysis pipeline
//!
//! Leaves first: blob store and extraction client, then the status updater
//! with its notification fan-out, the analysis router, reruns and intake.

pub mod analysis_router;
pub mod blob_store;
pub mod extraction_client;
pub mod intake;
pub mod notifier;
pub mod query_cache;
pub mod rerun;
pub mod status_updater;
pub mod store_status;

pub use analysis_router::{AnalysisRouter, Dispatch, DispatchAck, RouterError, RoutingTable};
pub use blob_store::{BlobStore, FsBlobStore};
pub use extraction_client::{ExtractionError, ExtractionService, HttpExtractionClient};
pub use intake::{
    Accepted, DocumentUpload, EmailAttachment, EmailPayload, IntakeError, IntakeService,
    PublicFormSubmission,
};
pub use notifier::{Notifier, Transition};
pub use query_cache::{CacheGroup, QueryCache};
pub use rerun::RerunService;
pub use status_updater::{BeginOutcome, StatusUpdater, TransitionOutcome, INTERRUPTED_ERROR};
pub use store_status::StoreStatusSource;
