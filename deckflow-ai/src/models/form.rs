//! Public form configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of `public_forms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicForm {
    pub slug: String,
    pub title: String,
    /// Trigger analysis as soon as a submission is stored
    pub auto_analyze: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /forms/{slug}`
#[derive(Debug, Clone, Deserialize)]
pub struct PublicFormInput {
    pub title: String,
    #[serde(default = "default_true")]
    pub auto_analyze: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}
