use sqlx::{Pool, Postgres};
use uuid::Uuid;

/// Audit trail in `billing_logs` (runtime query, no DATABASE_URL at build time).
pub async fn log_event(
    db: &Pool<Postgres>,
    action_type: &str,
    status: &str,
    server_id: Option<Uuid>,
    error_code: Option<&str>,
    error_message: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<Uuid, sqlx::Error> {
    let log_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO billing_logs
         (id, action_type, component, status, server_id, error_code, error_message, metadata, created_at)
         VALUES ($1, $2, 'finops', $3, $4, $5, $6, $7, NOW())",
    )
    .bind(log_id)
    .bind(action_type)
    .bind(status)
    .bind(server_id)
    .bind(error_code)
    .bind(error_message)
    .bind(metadata)
    .execute(db)
    .await?;

    tracing::debug!(action_type, status, %log_id, "billing log written");
    Ok(log_id)
}

/// Close a log row with its outcome and duration.
pub async fn log_event_complete(
    db: &Pool<Postgres>,
    log_id: Uuid,
    status: &str,
    duration_ms: i32,
    metadata: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE billing_logs
         SET status = $2, duration_ms = $3, metadata = COALESCE($4, metadata), completed_at = NOW()
         WHERE id = $1",
    )
    .bind(log_id)
    .bind(status)
    .bind(duration_ms)
    .bind(metadata)
    .execute(db)
    .await?;
    Ok(())
}

/// Best effort; a failed audit insert never fails the caller.
pub async fn log_quick(
    db: &Pool<Postgres>,
    action_type: &str,
    status: &str,
    server_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) {
    if let Err(e) = log_event(db, action_type, status, server_id, None, None, metadata).await {
        tracing::warn!("billing log {} not written: {}", action_type, e);
    }
}
