use sqlx::{Pool, Postgres};
use uuid::Uuid;

/// Billing audit entry written by the API (runtime query, no DATABASE_URL at build time).
pub async fn log_action(
    db: &Pool<Postgres>,
    action_type: &str,
    server_id: Option<Uuid>,
    metadata: serde_json::Value,
) {
    let res = sqlx::query(
        "INSERT INTO billing_logs (id, action_type, component, status, server_id, metadata, created_at)
         VALUES ($1, $2, 'api', 'success', $3, $4, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(action_type)
    .bind(server_id)
    .bind(metadata)
    .execute(db)
    .await;

    if let Err(e) = res {
        tracing::warn!("billing log {} not written: {}", action_type, e);
    }
}
