//! Database initialization on disk

use deckflow_common::db::init::init_database;

#[tokio::test]
async fn test_reopen_keeps_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("deckflow.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query(
        "INSERT INTO public_forms (slug, title, created_at, updated_at) VALUES ('demo', 'Demo', 'now', 'now')",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let title: String = sqlx::query_scalar("SELECT title FROM public_forms WHERE slug = 'demo'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Demo");

    let auto_analyze: i64 = sqlx::query_scalar("SELECT auto_analyze FROM public_forms WHERE slug = 'demo'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(auto_analyze, 1);
}

#[tokio::test]
async fn test_file_database_uses_wal() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("deckflow.db")).await.unwrap();

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_new_submission_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("deckflow.db")).await.unwrap();

    sqlx::query(
        r#"INSERT INTO submissions (id, source, form_slug, document_name, document_path, created_at, updated_at)
           VALUES ('s1', 'email', 'email-pitch', 'deck.pdf', 'submissions/s1/deck.pdf', 'now', 'now')"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let (status, generation, metadata): (String, i64, String) = sqlx::query_as(
        "SELECT analysis_status, analysis_generation, metadata FROM submissions WHERE id = 's1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "pending");
    assert_eq!(generation, 0);
    assert_eq!(metadata, "{}");
}
