//! Company store: materialization, enrichment and cascading delete

use deckflow_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_text, parse_timestamp, parse_uuid, placeholders};
use crate::models::{
    Company, CompanyDetail, CompanyEnrichment, DetailType, Evaluation, ResearchRecord, Section,
    SectionDetail,
};
use crate::utils::begin_monitored;

/// What a cascading delete removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeReport {
    pub submissions: Vec<Uuid>,
    /// Blob paths of the deleted submissions' decks
    pub document_paths: Vec<String>,
    pub sections: usize,
    pub details: usize,
    pub research: usize,
}

/// Materialize an evaluation and complete the submission in one transaction
///
/// The submission must still be `processing` at `generation`; otherwise
/// nothing is written and `None` is returned. The company row owned by the
/// submission is reused across reruns, its sections replaced wholesale.
pub async fn materialize_company(
    pool: &SqlitePool,
    submission_id: Uuid,
    generation: i64,
    evaluation: &Evaluation,
) -> Result<Option<Uuid>> {
    let now = now_text();
    let mut tx = begin_monitored(pool, "companies::materialize").await?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM companies WHERE submission_id = ?")
            .bind(submission_id.to_string())
            .fetch_optional(&mut **tx.inner_mut()?)
            .await?;
    let company_id = match existing {
        Some(id) => parse_uuid("companies.id", &id)?,
        None => Uuid::new_v4(),
    };

    let flipped = sqlx::query(
        r#"
        UPDATE submissions
        SET analysis_status = 'completed', company_id = ?, analysis_error = NULL,
            analyzed_at = ?, updated_at = ?
        WHERE id = ? AND analysis_status = 'processing' AND analysis_generation = ?
        "#,
    )
    .bind(company_id.to_string())
    .bind(&now)
    .bind(&now)
    .bind(submission_id.to_string())
    .bind(generation)
    .execute(&mut **tx.inner_mut()?)
    .await?;

    if flipped.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let assessment_points = serde_json::to_string(&evaluation.assessment_points)?;
    sqlx::query(
        r#"
        INSERT INTO companies (
            id, submission_id, name, overall_score, raw_score, score_scale,
            assessment_points, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(submission_id) DO UPDATE SET
            name = excluded.name,
            overall_score = excluded.overall_score,
            raw_score = excluded.raw_score,
            score_scale = excluded.score_scale,
            assessment_points = excluded.assessment_points,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(company_id.to_string())
    .bind(submission_id.to_string())
    .bind(&evaluation.company_name)
    .bind(evaluation.overall_score)
    .bind(evaluation.raw_score)
    .bind(evaluation.scale.as_str())
    .bind(&assessment_points)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx.inner_mut()?)
    .await?;

    sqlx::query(
        "DELETE FROM section_details WHERE section_id IN (SELECT id FROM sections WHERE company_id = ?)",
    )
    .bind(company_id.to_string())
    .execute(&mut **tx.inner_mut()?)
    .await?;
    sqlx::query("DELETE FROM sections WHERE company_id = ?")
        .bind(company_id.to_string())
        .execute(&mut **tx.inner_mut()?)
        .await?;

    for (position, section) in evaluation.sections.iter().enumerate() {
        let section_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO sections (id, company_id, position, section_type, title, score, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(section_id.to_string())
        .bind(company_id.to_string())
        .bind(position as i64)
        .bind(&section.section_type)
        .bind(&section.title)
        .bind(section.score)
        .bind(&section.description)
        .execute(&mut **tx.inner_mut()?)
        .await?;

        let details = section
            .strengths
            .iter()
            .map(|c| (DetailType::Strength, c))
            .chain(section.weaknesses.iter().map(|c| (DetailType::Weakness, c)));
        for (detail_type, content) in details {
            sqlx::query(
                "INSERT INTO section_details (id, section_id, detail_type, content) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(section_id.to_string())
            .bind(detail_type.as_str())
            .bind(content)
            .execute(&mut **tx.inner_mut()?)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::debug!(
        submission_id = %submission_id,
        company_id = %company_id,
        sections = evaluation.sections.len(),
        "Company materialized"
    );

    Ok(Some(company_id))
}

/// Load a company row
pub async fn load_company(pool: &SqlitePool, id: Uuid) -> Result<Option<Company>> {
    let row = sqlx::query(
        r#"
        SELECT id, submission_id, name, overall_score, raw_score, score_scale,
               assessment_points, website, industry, stage, introduction,
               created_at, updated_at
        FROM companies WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(company_from_row).transpose()
}

/// Load a company with its ordered sections, section details and research
pub async fn load_company_detail(pool: &SqlitePool, id: Uuid) -> Result<Option<CompanyDetail>> {
    let Some(company) = load_company(pool, id).await? else {
        return Ok(None);
    };

    let section_rows = sqlx::query(
        r#"
        SELECT id, position, section_type, title, score, description
        FROM sections WHERE company_id = ? ORDER BY position
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let detail_rows = sqlx::query(
        r#"
        SELECT d.id, d.section_id, d.detail_type, d.content
        FROM section_details d
        JOIN sections s ON s.id = d.section_id
        WHERE s.company_id = ?
        ORDER BY d.rowid
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let mut sections = Vec::with_capacity(section_rows.len());
    for row in &section_rows {
        sections.push(Section {
            id: parse_uuid("sections.id", &row.get::<String, _>("id"))?,
            position: row.get("position"),
            section_type: row.get("section_type"),
            title: row.get("title"),
            score: row.get("score"),
            description: row.get("description"),
            details: Vec::new(),
        });
    }

    for row in &detail_rows {
        let section_id = parse_uuid("section_details.section_id", &row.get::<String, _>("section_id"))?;
        let detail_type: String = row.get("detail_type");
        let detail_type = DetailType::parse(&detail_type).ok_or_else(|| {
            Error::Internal(format!("Unknown section detail type: {}", detail_type))
        })?;

        if let Some(section) = sections.iter_mut().find(|s| s.id == section_id) {
            section.details.push(SectionDetail {
                id: parse_uuid("section_details.id", &row.get::<String, _>("id"))?,
                detail_type,
                content: row.get("content"),
            });
        }
    }

    let research = load_research(pool, id).await?;

    Ok(Some(CompanyDetail {
        company,
        sections,
        research,
    }))
}

async fn load_research(pool: &SqlitePool, company_id: Uuid) -> Result<Vec<ResearchRecord>> {
    let rows = sqlx::query(
        "SELECT id, topic, content, created_at FROM company_research WHERE company_id = ? ORDER BY created_at, rowid",
    )
    .bind(company_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ResearchRecord {
                id: parse_uuid("company_research.id", &row.get::<String, _>("id"))?,
                topic: row.get("topic"),
                content: row.get("content"),
                created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
            })
        })
        .collect()
}

/// Fill enrichment fields that are still null and append research records
///
/// Returns `false` if the company does not exist.
pub async fn enrich_company(
    pool: &SqlitePool,
    id: Uuid,
    enrichment: &CompanyEnrichment,
) -> Result<bool> {
    let now = now_text();
    let mut tx = begin_monitored(pool, "companies::enrich").await?;

    let updated = sqlx::query(
        r#"
        UPDATE companies
        SET website = COALESCE(website, ?),
            industry = COALESCE(industry, ?),
            stage = COALESCE(stage, ?),
            introduction = COALESCE(introduction, ?),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&enrichment.website)
    .bind(&enrichment.industry)
    .bind(&enrichment.stage)
    .bind(&enrichment.introduction)
    .bind(&now)
    .bind(id.to_string())
    .execute(&mut **tx.inner_mut()?)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for research in &enrichment.research {
        sqlx::query(
            "INSERT INTO company_research (id, company_id, topic, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id.to_string())
        .bind(&research.topic)
        .bind(&research.content)
        .bind(&now)
        .execute(&mut **tx.inner_mut()?)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Delete a company and everything hanging off it
///
/// Order: section details, sections, research, submissions referencing the
/// company (or owning it), then the company row. Id lists are bound in
/// chunks of `chunk_size`. Returns `None` if the company does not exist.
pub async fn delete_company_cascade(
    pool: &SqlitePool,
    id: Uuid,
    chunk_size: usize,
) -> Result<Option<CascadeReport>> {
    let chunk_size = chunk_size.max(1);
    let mut tx = begin_monitored(pool, "companies::delete_cascade").await?;

    let owner: Option<String> = sqlx::query_scalar("SELECT submission_id FROM companies WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut **tx.inner_mut()?)
        .await?;
    let Some(owner) = owner else {
        tx.rollback().await?;
        return Ok(None);
    };

    let mut report = CascadeReport::default();

    let section_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM sections WHERE company_id = ?")
        .bind(id.to_string())
        .fetch_all(&mut **tx.inner_mut()?)
        .await?;

    for chunk in section_ids.chunks(chunk_size) {
        let sql = format!(
            "DELETE FROM section_details WHERE section_id IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query(&sql);
        for section_id in chunk {
            query = query.bind(section_id);
        }
        report.details += query.execute(&mut **tx.inner_mut()?).await?.rows_affected() as usize;
    }

    report.sections = sqlx::query("DELETE FROM sections WHERE company_id = ?")
        .bind(id.to_string())
        .execute(&mut **tx.inner_mut()?)
        .await?
        .rows_affected() as usize;

    report.research = sqlx::query("DELETE FROM company_research WHERE company_id = ?")
        .bind(id.to_string())
        .execute(&mut **tx.inner_mut()?)
        .await?
        .rows_affected() as usize;

    let submission_rows = sqlx::query(
        "SELECT id, document_path FROM submissions WHERE company_id = ? OR id = ?",
    )
    .bind(id.to_string())
    .bind(&owner)
    .fetch_all(&mut **tx.inner_mut()?)
    .await?;

    let mut submission_ids = Vec::with_capacity(submission_rows.len());
    for row in &submission_rows {
        let submission_id: String = row.get("id");
        report.submissions.push(parse_uuid("submissions.id", &submission_id)?);
        report.document_paths.push(row.get("document_path"));
        submission_ids.push(submission_id);
    }

    for chunk in submission_ids.chunks(chunk_size) {
        let sql = format!(
            "DELETE FROM submissions WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query(&sql);
        for submission_id in chunk {
            query = query.bind(submission_id);
        }
        query.execute(&mut **tx.inner_mut()?).await?;
    }

    sqlx::query("DELETE FROM companies WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut **tx.inner_mut()?)
        .await?;

    tx.commit().await?;

    tracing::info!(
        company_id = %id,
        submissions = report.submissions.len(),
        sections = report.sections,
        "Company deleted"
    );

    Ok(Some(report))
}

fn company_from_row(row: &SqliteRow) -> Result<Company> {
    let assessment_points: String = row.get("assessment_points");

    Ok(Company {
        id: parse_uuid("companies.id", &row.get::<String, _>("id"))?,
        submission_id: parse_uuid("companies.submission_id", &row.get::<String, _>("submission_id"))?,
        name: row.get("name"),
        overall_score: row.get("overall_score"),
        raw_score: row.get("raw_score"),
        score_scale: row.get("score_scale"),
        assessment_points: serde_json::from_str(&assessment_points)?,
        website: row.get("website"),
        industry: row.get("industry"),
        stage: row.get("stage"),
        introduction: row.get("introduction"),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp("updated_at", &row.get::<String, _>("updated_at"))?,
    })
}
