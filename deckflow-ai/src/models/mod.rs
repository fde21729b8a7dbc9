//! Data models for deckflow-ai

pub mod company;
pub mod extraction;
pub mod form;
pub mod submission;

pub use company::{
    Company, CompanyDetail, CompanyEnrichment, DetailType, ResearchInput, ResearchRecord, Section,
    SectionDetail,
};
pub use extraction::{
    EvaluatedSection, Evaluation, ExtractedSection, ExtractionRequest, ExtractionResult, Routine,
    ScoreScale,
};
pub use form::{PublicForm, PublicFormInput};
pub use submission::{
    sanitize_file_name, NewSubmission, StatusUpdate, Submission, SubmissionFilter,
    SubmissionSource, EMAIL_SLUG, UPLOAD_SLUG,
};
