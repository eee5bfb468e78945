use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use redis::AsyncCommands;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::bus::{BillingCommand, CHANNEL_BILLING_COMMANDS};

use crate::app::AppState;
use crate::auth::{self, AuthUser};
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ReconcileRequest {
    /// Omit to reconcile every server.
    pub server_id: Option<Uuid>,
}

/// POST /reconcile - ask the billing service for an immediate reconciliation
#[utoipa::path(
    post,
    path = "/reconcile",
    tag = "Commands",
    request_body = ReconcileRequest,
    responses(
        (status = 202, description = "Reconciliation triggered", body = serde_json::Value),
        (status = 403, description = "Operator only"),
        (status = 503, description = "Failed to publish the command", body = serde_json::Value)
    )
)]
pub async fn manual_reconcile_trigger(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<ReconcileRequest>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    auth::require_operator(&user)?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let cmd = BillingCommand::reconcile(req.server_id);
    tracing::info!(server_id = ?req.server_id, "manual reconciliation triggered");

    let published = async {
        let mut conn = state.redis_client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&cmd)?;
        conn.publish::<_, _, ()>(CHANNEL_BILLING_COMMANDS, payload).await?;
        anyhow::Ok(())
    }
    .await;

    Ok(match published {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "triggered",
                "message": "Reconciliation task has been triggered",
                "server_id": req.server_id,
            })),
        ),
        Err(e) => {
            tracing::error!("failed to publish reconciliation command: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error":"bus_unavailable","message":"failed_to_trigger_reconciliation"})),
            )
        }
    })
}
