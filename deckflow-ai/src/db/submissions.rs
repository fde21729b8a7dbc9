//! Submission store
//!
//! Analysis columns (`analysis_status`, `analysis_result`, `analysis_error`,
//! `company_id`, `analysis_generation`) are written only through the status
//! updater. Terminal writes carry the generation they were computed for and
//! are no-ops when the submission has moved on.

use deckflow_common::api::{ResultSummary, StatusSnapshot};
use deckflow_common::{AnalysisStatus, Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_text, parse_timestamp, parse_uuid, placeholders};
use crate::models::{NewSubmission, StatusUpdate, Submission, SubmissionFilter};
use crate::utils::{retry_on_lock, MAX_LOCK_WAIT_MS};

const SUBMISSION_COLUMNS: &str = r#"
    id, source, form_slug, submitter, company_name_hint, title, metadata,
    document_name, document_path, analysis_status, analysis_result,
    analysis_error, company_id, analysis_generation, created_at, updated_at,
    analyzed_at
"#;

/// Default page size for list queries
const DEFAULT_LIST_LIMIT: u32 = 200;

/// Rerun scan row: a terminal submission and its company score, if any
#[derive(Debug, Clone, PartialEq)]
pub struct RerunCandidate {
    pub id: Uuid,
    pub form_slug: String,
    pub status: AnalysisStatus,
    /// Canonical 0-5 score of the owned company
    pub overall_score: Option<f64>,
}

/// Insert a new submission at `pending`
pub async fn create_submission(pool: &SqlitePool, new: &NewSubmission) -> Result<Submission> {
    let now = now_text();
    let metadata = serde_json::to_string(&new.metadata)?;

    let (now, metadata) = (now.as_str(), metadata.as_str());

    retry_on_lock("submission create", MAX_LOCK_WAIT_MS, || async move {
        sqlx::query(
            r#"
            INSERT INTO submissions (
                id, source, form_slug, submitter, company_name_hint, title,
                metadata, document_name, document_path, analysis_status,
                analysis_generation, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(new.id.to_string())
        .bind(new.source.as_str())
        .bind(&new.form_slug)
        .bind(&new.submitter)
        .bind(&new.company_name_hint)
        .bind(&new.title)
        .bind(metadata)
        .bind(&new.document_name)
        .bind(&new.document_path)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await?;

    load_submission(pool, new.id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Submission {} vanished after insert", new.id)))
}

/// Load a submission by id
pub async fn load_submission(pool: &SqlitePool, id: Uuid) -> Result<Option<Submission>> {
    let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(submission_from_row).transpose()
}

/// Write a status transition
///
/// With `expected_generation`, the write only applies while the submission is
/// still `processing` at that generation. Returns whether a row changed.
pub async fn update_status(
    pool: &SqlitePool,
    id: Uuid,
    update: &StatusUpdate,
    expected_generation: Option<i64>,
) -> Result<bool> {
    let error = match update.status {
        AnalysisStatus::Failed => update.error.as_deref(),
        _ => None,
    };
    let company_id = match update.status {
        AnalysisStatus::Completed => update.company_id.map(|c| c.to_string()),
        _ => None,
    };
    let company_id = company_id.as_deref();
    let now = now_text();
    let now = now.as_str();
    let analyzed_at = update.status.is_terminal().then_some(now);

    let guard = if expected_generation.is_some() {
        "AND analysis_status = 'processing' AND analysis_generation = ?"
    } else {
        ""
    };
    let sql = format!(
        r#"
        UPDATE submissions
        SET analysis_status = ?, analysis_error = ?, company_id = ?,
            analyzed_at = COALESCE(?, analyzed_at), updated_at = ?
        WHERE id = ? {}
        "#,
        guard
    );
    let sql = sql.as_str();

    let rows = retry_on_lock("submission status update", MAX_LOCK_WAIT_MS, || async move {
        let mut query = sqlx::query(sql)
            .bind(update.status.as_str())
            .bind(error)
            .bind(company_id)
            .bind(analyzed_at)
            .bind(now)
            .bind(id.to_string());
        if let Some(generation) = expected_generation {
            query = query.bind(generation);
        }
        Ok::<_, Error>(query.execute(pool).await?.rows_affected())
    })
    .await?;

    Ok(rows > 0)
}

/// Compare-and-set `pending -> processing`
///
/// Returns the new generation, or `None` if the submission was not pending.
pub async fn mark_processing_if_pending(pool: &SqlitePool, id: Uuid) -> Result<Option<i64>> {
    let now = now_text();
    let now = now.as_str();

    retry_on_lock("submission begin processing", MAX_LOCK_WAIT_MS, || async move {
        let generation = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE submissions
            SET analysis_status = 'processing',
                analysis_generation = analysis_generation + 1,
                analysis_error = NULL,
                updated_at = ?
            WHERE id = ? AND analysis_status = 'pending'
            RETURNING analysis_generation
            "#,
        )
        .bind(now)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
        Ok::<_, Error>(generation)
    })
    .await
}

/// Store the raw extraction result for the given generation
pub async fn record_result(
    pool: &SqlitePool,
    id: Uuid,
    generation: i64,
    result: &serde_json::Value,
) -> Result<bool> {
    let result = serde_json::to_string(result)?;
    let result = result.as_str();
    let now = now_text();
    let now = now.as_str();

    let rows = retry_on_lock("submission record result", MAX_LOCK_WAIT_MS, || async move {
        let done = sqlx::query(
            r#"
            UPDATE submissions
            SET analysis_result = ?, updated_at = ?
            WHERE id = ? AND analysis_status = 'processing' AND analysis_generation = ?
            "#,
        )
        .bind(result)
        .bind(now)
        .bind(id.to_string())
        .bind(generation)
        .execute(pool)
        .await?;
        Ok::<_, Error>(done.rows_affected())
    })
    .await?;

    Ok(rows > 0)
}

/// Submissions for a form slug in a given status, oldest first
pub async fn find_by_slug_and_status(
    pool: &SqlitePool,
    slug: &str,
    status: AnalysisStatus,
) -> Result<Vec<Submission>> {
    let sql = format!(
        "SELECT {} FROM submissions WHERE form_slug = ? AND analysis_status = ? ORDER BY created_at, id",
        SUBMISSION_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(slug)
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

    rows.iter().map(submission_from_row).collect()
}

/// Filtered list, newest first
pub async fn list_submissions(pool: &SqlitePool, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
    let mut conditions = Vec::new();
    let mut params: Vec<&str> = Vec::new();

    if let Some(source) = &filter.source {
        conditions.push("source = ?");
        params.push(source.as_str());
    }
    if let Some(slug) = &filter.slug {
        conditions.push("form_slug = ?");
        params.push(slug.as_str());
    }
    if let Some(status) = &filter.status {
        conditions.push("analysis_status = ?");
        params.push(status.as_str());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM submissions {} ORDER BY created_at DESC, id LIMIT ?",
        SUBMISSION_COLUMNS, where_clause
    );

    let mut query = sqlx::query(&sql);
    for param in params {
        query = query.bind(param);
    }
    let rows = query
        .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .fetch_all(pool)
        .await?;

    rows.iter().map(submission_from_row).collect()
}

/// Status view for status queries and the watcher's poll path
pub async fn load_status_snapshot(pool: &SqlitePool, id: Uuid) -> Result<Option<StatusSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT s.id, s.analysis_status, s.analysis_error, s.company_id,
               c.name AS company_name, c.overall_score,
               (SELECT COUNT(*) FROM sections sec WHERE sec.company_id = c.id) AS section_count
        FROM submissions s
        LEFT JOIN companies c ON c.id = s.company_id
        WHERE s.id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: AnalysisStatus = row.get::<String, _>("analysis_status").parse()?;
    let company_id: Option<String> = row.get("company_id");
    let company_id = company_id
        .as_deref()
        .map(|c| parse_uuid("company_id", c))
        .transpose()?;
    let company_name: Option<String> = row.get("company_name");
    let overall_score: Option<f64> = row.get("overall_score");
    let section_count: i64 = row.get("section_count");

    let result_summary = match (status, company_name, overall_score) {
        (AnalysisStatus::Completed, Some(company_name), Some(overall_score)) => Some(ResultSummary {
            company_name,
            overall_score,
            section_count: section_count.max(0) as usize,
        }),
        _ => None,
    };

    Ok(Some(StatusSnapshot {
        submission_id: id,
        status,
        company_id,
        result_summary,
        error: row.get("analysis_error"),
    }))
}

/// Every failed or completed submission with the score of its company
pub async fn list_rerun_candidates(pool: &SqlitePool) -> Result<Vec<RerunCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.form_slug, s.analysis_status, c.overall_score
        FROM submissions s
        LEFT JOIN companies c ON c.submission_id = s.id
        WHERE s.analysis_status IN ('failed', 'completed')
        ORDER BY s.created_at, s.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RerunCandidate {
                id: parse_uuid("id", &row.get::<String, _>("id"))?,
                form_slug: row.get("form_slug"),
                status: row.get::<String, _>("analysis_status").parse()?,
                overall_score: row.get("overall_score"),
            })
        })
        .collect()
}

/// Move terminal submissions back to `processing` for a rerun
///
/// Clears `analysis_error` and `company_id` and bumps the generation. Ids
/// are processed in chunks of `chunk_size`. Submissions that are no longer
/// terminal are skipped. Returns `(id, new generation)` for each reset row.
pub async fn reset_for_rerun(
    pool: &SqlitePool,
    ids: &[Uuid],
    chunk_size: usize,
) -> Result<Vec<(Uuid, i64)>> {
    let now = now_text();
    let now = now.as_str();
    let mut reset = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(chunk_size.max(1)) {
        let sql = format!(
            r#"
            UPDATE submissions
            SET analysis_status = 'processing',
                analysis_generation = analysis_generation + 1,
                analysis_error = NULL,
                company_id = NULL,
                updated_at = ?
            WHERE id IN ({}) AND analysis_status IN ('completed', 'failed')
            RETURNING id, analysis_generation
            "#,
            placeholders(chunk.len())
        );
        let sql = sql.as_str();

        let rows = retry_on_lock("submission rerun reset", MAX_LOCK_WAIT_MS, || async move {
            let mut query = sqlx::query(sql).bind(now);
            for id in chunk {
                query = query.bind(id.to_string());
            }
            Ok::<_, Error>(query.fetch_all(pool).await?)
        })
        .await?;

        for row in rows {
            let id = parse_uuid("id", &row.get::<String, _>("id"))?;
            reset.push((id, row.get::<i64, _>("analysis_generation")));
        }
    }

    Ok(reset)
}

/// Fail every submission left `processing` (startup recovery)
pub async fn fail_interrupted(pool: &SqlitePool, message: &str) -> Result<Vec<Uuid>> {
    let now = now_text();
    let now = now.as_str();

    let ids = retry_on_lock("submission interrupt recovery", MAX_LOCK_WAIT_MS, || async move {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE submissions
            SET analysis_status = 'failed', analysis_error = ?, company_id = NULL,
                analyzed_at = ?, updated_at = ?
            WHERE analysis_status = 'processing'
            RETURNING id
            "#,
        )
        .bind(message)
        .bind(now)
        .bind(now)
        .fetch_all(pool)
        .await?;
        Ok::<_, Error>(ids)
    })
    .await?;

    ids.iter().map(|id| parse_uuid("id", id)).collect()
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission> {
    let metadata: String = row.get("metadata");
    let analysis_result: Option<String> = row.get("analysis_result");
    let company_id: Option<String> = row.get("company_id");
    let analyzed_at: Option<String> = row.get("analyzed_at");

    Ok(Submission {
        id: parse_uuid("id", &row.get::<String, _>("id"))?,
        source: row.get::<String, _>("source").parse()?,
        form_slug: row.get("form_slug"),
        submitter: row.get("submitter"),
        company_name_hint: row.get("company_name_hint"),
        title: row.get("title"),
        metadata: serde_json::from_str(&metadata)?,
        document_name: row.get("document_name"),
        document_path: row.get("document_path"),
        analysis_status: row.get::<String, _>("analysis_status").parse()?,
        analysis_result: analysis_result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        analysis_error: row.get("analysis_error"),
        company_id: company_id
            .as_deref()
            .map(|c| parse_uuid("company_id", c))
            .transpose()?,
        analysis_generation: row.get("analysis_generation"),
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp("updated_at", &row.get::<String, _>("updated_at"))?,
        analyzed_at: analyzed_at
            .as_deref()
            .map(|t| parse_timestamp("analyzed_at", t))
            .transpose()?,
    })
}
