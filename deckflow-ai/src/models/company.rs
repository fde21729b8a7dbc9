//! Company records materialized from completed evaluations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Company row (scores on the canonical 0-5 scale)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub name: String,
    pub overall_score: f64,
    /// Score as returned by the extraction service
    pub raw_score: f64,
    pub score_scale: String,
    pub assessment_points: Vec<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub stage: Option<String>,
    pub introduction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub position: i64,
    pub section_type: String,
    pub title: String,
    pub score: f64,
    pub description: String,
    pub details: Vec<SectionDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailType {
    Strength,
    Weakness,
}

impl DetailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailType::Strength => "strength",
            DetailType::Weakness => "weakness",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strength" => Some(DetailType::Strength),
            "weakness" => Some(DetailType::Weakness),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDetail {
    pub id: Uuid,
    pub detail_type: DetailType,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: Uuid,
    pub topic: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Company with its ordered sections and research (`GET /companies/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub sections: Vec<Section>,
    pub research: Vec<ResearchRecord>,
}

/// Additive enrichment (`PATCH /companies/{id}`)
///
/// Only fields that are currently null on the company are filled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyEnrichment {
    pub website: Option<String>,
    pub industry: Option<String>,
    pub stage: Option<String>,
    pub introduction: Option<String>,
    #[serde(default)]
    pub research: Vec<ResearchInput>,
}

impl CompanyEnrichment {
    pub fn is_empty(&self) -> bool {
        self.website.is_none()
            && self.industry.is_none()
            && self.stage.is_none()
            && self.introduction.is_none()
            && self.research.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchInput {
    pub topic: String,
    pub content: String,
}
