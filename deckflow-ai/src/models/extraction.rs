//! Extraction routines and the extraction service wire contract
//!
//! The extraction service is opaque: it receives a deck plus routine context
//! and answers with a scored evaluation. Scores arrive either on a 0-5 or a
//! 0-100 scale; [`Evaluation::from_result`] is the single place where they are
//! brought to the canonical 0-5 scale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Submission;

/// Extraction routine selected by the analysis router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routine {
    /// Default routine for decks without a dedicated form family
    PitchDeck,
    EurekaForm,
    BarcForm,
    EmailPitch,
}

impl Routine {
    /// Name reported to callers as `analysisFunction`
    pub fn function_name(&self) -> &'static str {
        match self {
            Routine::PitchDeck => "analyze-pdf",
            Routine::EurekaForm => "analyze-eureka-form",
            Routine::BarcForm => "analyze-barc-form",
            Routine::EmailPitch => "analyze-email-pitch-pdf",
        }
    }

    /// Family key used for per-family configuration (quality thresholds)
    pub fn family(&self) -> &'static str {
        match self {
            Routine::PitchDeck => "pitch_deck",
            Routine::EurekaForm => "eureka_form",
            Routine::BarcForm => "barc_form",
            Routine::EmailPitch => "email_pitch",
        }
    }

    /// Scale the routine reports scores on unless the result says otherwise
    pub fn default_scale(&self) -> ScoreScale {
        match self {
            Routine::PitchDeck | Routine::EmailPitch => ScoreScale::FivePoint,
            Routine::EurekaForm | Routine::BarcForm => ScoreScale::Percent,
        }
    }

    /// Routine-specific context sent alongside the document
    pub fn build_context(&self, submission: &Submission) -> serde_json::Value {
        let mut context = serde_json::json!({
            "submission_id": submission.id,
            "source": submission.source,
            "form_slug": submission.form_slug,
            "company_name": submission.company_name_hint,
            "title": submission.title,
        });

        match self {
            Routine::EurekaForm | Routine::BarcForm => {
                // Form families are scored against the applicant's answers
                context["form_answers"] = submission.metadata.clone();
            }
            Routine::EmailPitch => {
                context["sender"] = serde_json::json!(submission.submitter);
                context["subject"] = submission
                    .metadata
                    .get("subject")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
            }
            Routine::PitchDeck => {}
        }

        context
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family())
    }
}

impl FromStr for Routine {
    type Err = deckflow_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pitch_deck" | "analyze-pdf" => Ok(Routine::PitchDeck),
            "eureka_form" | "analyze-eureka-form" => Ok(Routine::EurekaForm),
            "barc_form" | "analyze-barc-form" => Ok(Routine::BarcForm),
            "email_pitch" | "analyze-email-pitch-pdf" => Ok(Routine::EmailPitch),
            other => Err(deckflow_common::Error::Config(format!(
                "Unknown extraction routine: {}",
                other
            ))),
        }
    }
}

/// Score scale of an extraction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScale {
    /// 0-5
    FivePoint,
    /// 0-100
    Percent,
}

impl ScoreScale {
    pub fn max(&self) -> f64 {
        match self {
            ScoreScale::FivePoint => 5.0,
            ScoreScale::Percent => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreScale::FivePoint => "five_point",
            ScoreScale::Percent => "percent",
        }
    }

    /// Convert a raw score on this scale to the canonical 0-5 scale
    pub fn to_canonical(&self, raw: f64) -> f64 {
        let value = match self {
            ScoreScale::FivePoint => raw,
            ScoreScale::Percent => raw / 20.0,
        };
        (value * 100.0).round() / 100.0
    }
}

/// Input to one extraction call
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub routine: Routine,
    pub document_name: String,
    pub document: Vec<u8>,
    pub context: serde_json::Value,
}

/// Raw extraction service answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub company_name: Option<String>,
    pub overall_score: f64,
    #[serde(default)]
    pub score_scale: Option<ScoreScale>,
    #[serde(default)]
    pub assessment_points: Vec<String>,
    #[serde(default)]
    pub sections: Vec<ExtractedSection>,
}

/// One scored deck section as returned by the extraction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSection {
    #[serde(rename = "type")]
    pub section_type: String,
    pub title: String,
    pub score: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

/// Validated result with canonical 0-5 scores, ready to materialize
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub company_name: String,
    pub overall_score: f64,
    pub raw_score: f64,
    pub scale: ScoreScale,
    pub assessment_points: Vec<String>,
    pub sections: Vec<EvaluatedSection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedSection {
    pub section_type: String,
    pub title: String,
    pub score: f64,
    pub description: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

impl Evaluation {
    /// Validate a raw result and convert its scores to 0-5
    ///
    /// `fallback_name` is used when the service did not name the company.
    pub fn from_result(
        result: &ExtractionResult,
        routine: Routine,
        fallback_name: Option<&str>,
    ) -> Result<Self, String> {
        let scale = result.score_scale.unwrap_or_else(|| routine.default_scale());

        let company_name = result
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| fallback_name.map(str::trim).filter(|n| !n.is_empty()))
            .ok_or_else(|| "result does not name the company".to_string())?
            .to_string();

        check_score("overall_score", result.overall_score, scale)?;

        let mut sections = Vec::with_capacity(result.sections.len());
        for section in &result.sections {
            check_score(&format!("section '{}'", section.title), section.score, scale)?;
            sections.push(EvaluatedSection {
                section_type: section.section_type.trim().to_lowercase(),
                title: section.title.trim().to_string(),
                score: scale.to_canonical(section.score),
                description: section.description.trim().to_string(),
                strengths: clean_points(&section.strengths),
                weaknesses: clean_points(&section.weaknesses),
            });
        }

        Ok(Self {
            company_name,
            overall_score: scale.to_canonical(result.overall_score),
            raw_score: result.overall_score,
            scale,
            assessment_points: clean_points(&result.assessment_points),
            sections,
        })
    }
}

fn check_score(what: &str, score: f64, scale: ScoreScale) -> Result<(), String> {
    if !score.is_finite() || score < 0.0 || score > scale.max() {
        return Err(format!(
            "{} {} is outside the {} range 0-{}",
            what,
            score,
            scale.as_str(),
            scale.max()
        ));
    }
    Ok(())
}

fn clean_points(points: &[String]) -> Vec<String> {
    points
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64, scale: Option<ScoreScale>) -> ExtractionResult {
        ExtractionResult {
            company_name: Some(" Acme Robotics ".to_string()),
            overall_score: score,
            score_scale: scale,
            assessment_points: vec!["Strong team".to_string(), "  ".to_string()],
            sections: vec![ExtractedSection {
                section_type: "Team".to_string(),
                title: "Team".to_string(),
                score: 90.0,
                description: "Experienced founders".to_string(),
                strengths: vec!["Domain expertise".to_string()],
                weaknesses: vec![],
            }],
        }
    }

    #[test]
    fn test_percent_score_converted_once() {
        let evaluation = Evaluation::from_result(&result(84.0, None), Routine::EurekaForm, None).unwrap();

        assert_eq!(evaluation.overall_score, 4.2);
        assert_eq!(evaluation.raw_score, 84.0);
        assert_eq!(evaluation.scale, ScoreScale::Percent);
        assert_eq!(evaluation.sections[0].score, 4.5);
        assert_eq!(evaluation.sections[0].section_type, "team");
        assert_eq!(evaluation.company_name, "Acme Robotics");
        assert_eq!(evaluation.assessment_points, vec!["Strong team".to_string()]);
    }

    #[test]
    fn test_explicit_scale_overrides_routine_default() {
        let mut raw = result(3.5, Some(ScoreScale::FivePoint));
        raw.sections[0].score = 4.0;
        let evaluation = Evaluation::from_result(&raw, Routine::BarcForm, None).unwrap();
        assert_eq!(evaluation.overall_score, 3.5);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let err = Evaluation::from_result(&result(84.0, None), Routine::PitchDeck, None).unwrap_err();
        assert!(err.contains("overall_score"));

        let nan = Evaluation::from_result(&result(f64::NAN, None), Routine::EurekaForm, None);
        assert!(nan.is_err());
    }

    #[test]
    fn test_company_name_falls_back_to_hint() {
        let mut raw = result(80.0, None);
        raw.company_name = None;

        assert!(Evaluation::from_result(&raw, Routine::EurekaForm, None).is_err());
        let evaluation = Evaluation::from_result(&raw, Routine::EurekaForm, Some("Hinted Co")).unwrap();
        assert_eq!(evaluation.company_name, "Hinted Co");
    }

    #[test]
    fn test_routine_names_parse_both_ways() {
        for routine in [
            Routine::PitchDeck,
            Routine::EurekaForm,
            Routine::BarcForm,
            Routine::EmailPitch,
        ] {
            assert_eq!(routine.family().parse::<Routine>().unwrap(), routine);
            assert_eq!(routine.function_name().parse::<Routine>().unwrap(), routine);
        }
    }
}
