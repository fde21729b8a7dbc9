//! Public form configuration store

use deckflow_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use super::{now_text, parse_timestamp};
use crate::models::{PublicForm, PublicFormInput};
use crate::utils::{retry_on_lock, MAX_LOCK_WAIT_MS};

/// Load a form by slug
pub async fn load_form(pool: &SqlitePool, slug: &str) -> Result<Option<PublicForm>> {
    let row = sqlx::query(
        r#"
        SELECT slug, title, auto_analyze, is_active, created_at, updated_at
        FROM public_forms WHERE slug = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(PublicForm {
        slug: row.get("slug"),
        title: row.get("title"),
        auto_analyze: row.get::<i64, _>("auto_analyze") != 0,
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp("updated_at", &row.get::<String, _>("updated_at"))?,
    }))
}

/// Create or replace a form's configuration
pub async fn upsert_form(pool: &SqlitePool, slug: &str, input: &PublicFormInput) -> Result<PublicForm> {
    let now = now_text();
    let now = now.as_str();

    retry_on_lock("public form upsert", MAX_LOCK_WAIT_MS, || async move {
        sqlx::query(
            r#"
            INSERT INTO public_forms (slug, title, auto_analyze, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                title = excluded.title,
                auto_analyze = excluded.auto_analyze,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slug)
        .bind(&input.title)
        .bind(input.auto_analyze as i64)
        .bind(input.is_active as i64)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok::<_, Error>(())
    })
    .await?;

    load_form(pool, slug)
        .await?
        .ok_or_else(|| Error::Internal(format!("Form {} vanished after upsert", slug)))
}
