//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date.
//! Every statement is `CREATE ... IF NOT EXISTS`, so initialization is safe to
//! repeat on each startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets status readers (poll path) run alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Uses a single connection that never expires: every pooled connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_public_forms_table(pool).await?;
    create_submissions_table(pool).await?;
    create_companies_table(pool).await?;
    create_sections_table(pool).await?;
    create_section_details_table(pool).await?;
    create_company_research_table(pool).await?;

    info!("Database schema initialized");
    Ok(())
}

/// Public form configurations; `auto_analyze` controls the trigger on insert
pub async fn create_public_forms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS public_forms (
            slug TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            auto_analyze INTEGER NOT NULL DEFAULT 1,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per inbound pitch deck
pub async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL CHECK (source IN ('upload', 'public_form', 'email')),
            form_slug TEXT NOT NULL,
            submitter TEXT,
            company_name_hint TEXT,
            title TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            document_name TEXT NOT NULL,
            document_path TEXT NOT NULL,
            analysis_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (analysis_status IN ('pending', 'processing', 'completed', 'failed')),
            analysis_result TEXT,
            analysis_error TEXT,
            company_id TEXT,
            analysis_generation INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            analyzed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_submissions_slug_status ON submissions(form_slug, analysis_status)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_company ON submissions(company_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Materialized evaluation results, one per submission
pub async fn create_companies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            overall_score REAL NOT NULL,
            raw_score REAL NOT NULL,
            score_scale TEXT NOT NULL,
            assessment_points TEXT NOT NULL DEFAULT '[]',
            website TEXT,
            industry TEXT,
            stage TEXT,
            introduction TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-section scores of a company
pub async fn create_sections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            position INTEGER NOT NULL,
            section_type TEXT NOT NULL,
            title TEXT NOT NULL,
            score REAL NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sections_company ON sections(company_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Strengths and weaknesses listed under a section
pub async fn create_section_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS section_details (
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES sections(id),
            detail_type TEXT NOT NULL CHECK (detail_type IN ('strength', 'weakness')),
            content TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_section_details_section ON section_details(section_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Auxiliary research records attached to a company
pub async fn create_company_research_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS company_research (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id),
            topic TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
