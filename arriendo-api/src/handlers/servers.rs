use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::accrual::{self, TransitionOutcome};
use arriendo_common::bus::{BillingEventEnvelope, BillingEventType, CHANNEL_BILLING_EVENTS};
use arriendo_common::store::{self, PAYMENT_COLUMNS, SERVER_COLUMNS};
use arriendo_common::{PagoMensual, Server, ServerStatus};

use crate::app::AppState;
use crate::audit_log;
use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::rbac;

pub const EVENT_SOURCE: &str = "arriendo-api";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ServerView {
    #[serde(flatten)]
    pub server: Server,
    /// Active time including the open running interval, as of the response.
    /// Null when the stored accrual state is inconsistent.
    pub effective_active_ms: Option<i64>,
    pub unbilled_ms: Option<i64>,
}

impl ServerView {
    fn new(server: Server) -> ApiResult<Self> {
        let effective_active_ms = accrual::effective_active_ms(&server, Utc::now())?;
        Ok(Self::with_active_ms(server, Some(effective_active_ms)))
    }

    /// Listing variant: a row with inconsistent accrual state is still shown.
    pub fn lenient(server: Server) -> Self {
        match accrual::effective_active_ms(&server, Utc::now()) {
            Ok(ms) => Self::with_active_ms(server, Some(ms)),
            Err(e) => {
                tracing::warn!(server_id = %server.id, "accrual state not shown: {}", e);
                Self::with_active_ms(server, None)
            }
        }
    }

    fn with_active_ms(server: Server, effective_active_ms: Option<i64>) -> Self {
        let unbilled_ms = effective_active_ms.map(|ms| ms - server.billed_active_ms);
        Self {
            server,
            effective_active_ms,
            unbilled_ms,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TransitionRequest {
    pub estado: ServerStatus,
}

async fn fetch_server(state: &AppState, id: Uuid) -> ApiResult<Server> {
    let sql = format!("SELECT {} FROM servers WHERE id = $1", SERVER_COLUMNS);
    sqlx::query_as::<Postgres, Server>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("server_not_found"))
}

/// Servers of other clients are reported as missing.
pub(crate) async fn fetch_visible_server(state: &AppState, user: &AuthUser, id: Uuid) -> ApiResult<Server> {
    let server = fetch_server(state, id).await?;
    if !rbac::can_view_server(user.role, user.user_id, server.cliente_id) {
        return Err(ApiError::NotFound("server_not_found"));
    }
    Ok(server)
}

#[utoipa::path(
    get,
    path = "/servers",
    tag = "Servers",
    responses((status = 200, description = "Servers visible to the caller", body = Vec<ServerView>))
)]
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ServerView>>> {
    let own_only = if rbac::can_operate(user.role) { None } else { Some(user.user_id) };
    let sql = format!(
        "SELECT {} FROM servers WHERE ($1::uuid IS NULL OR cliente_id = $1) ORDER BY created_at DESC",
        SERVER_COLUMNS
    );
    let rows = sqlx::query_as::<Postgres, Server>(&sql)
        .bind(own_only)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows.into_iter().map(ServerView::lenient).collect()))
}

#[utoipa::path(
    get,
    path = "/servers/{id}",
    tag = "Servers",
    responses(
        (status = 200, description = "Server with its effective active time", body = ServerView),
        (status = 404, description = "Server not found")
    )
)]
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServerView>> {
    let server = fetch_visible_server(&state, &user, id).await?;
    Ok(Json(ServerView::new(server)?))
}

async fn lock_server(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> ApiResult<Server> {
    store::lock_server(tx, id)
        .await?
        .ok_or(ApiError::NotFound("server_not_found"))
}

/// Change a server's status. Accrual fields and the closed running interval
/// are written in the same transaction that holds the server row lock.
#[utoipa::path(
    post,
    path = "/servers/{id}/transition",
    tag = "Servers",
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Transition applied", body = ServerView),
        (status = 403, description = "Operator only"),
        (status = 404, description = "Server not found"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn transition_server(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<ServerView>> {
    auth::require_operator(&user)?;
    let at = Utc::now();

    let mut tx = state.db.begin().await?;
    let mut server = lock_server(&mut tx, id).await?;
    let outcome = accrual::transition(&mut server, req.estado, at)?;

    if let Some(iv) = &outcome.closed_interval {
        store::insert_interval(&mut tx, iv).await?;
    }
    store::save_accrual(&mut tx, &server).await?;
    tx.commit().await?;

    tracing::info!(
        server_id = %id,
        from = %outcome.from,
        to = %outcome.to,
        accrued_ms = outcome.accrued_ms,
        "server transition"
    );
    publish_accrual_event(&state, &server, &outcome).await;
    if outcome.from != outcome.to {
        audit_log::log_action(
            &state.db,
            "SERVER_TRANSITION",
            Some(id),
            serde_json::json!({
                "from": outcome.from.as_str(),
                "to": outcome.to.as_str(),
                "accrued_ms": outcome.accrued_ms,
                "by": user.user_id,
            }),
        )
        .await;
    }
    Ok(Json(ServerView::new(server)?))
}

async fn publish_accrual_event(state: &AppState, server: &Server, outcome: &TransitionOutcome) {
    let event_type = if outcome.stopped_accrual() {
        BillingEventType::ServerAccrualStop
    } else if outcome.started_accrual() {
        BillingEventType::ServerAccrualStart
    } else {
        return;
    };
    let evt = BillingEventEnvelope::new(
        event_type,
        Utc::now(),
        serde_json::json!({
            "server_id": server.id.to_string(),
            "from": outcome.from.as_str(),
            "to": outcome.to.as_str(),
            "accrued_ms": outcome.accrued_ms,
            "active_ms": server.active_ms,
        }),
        EVENT_SOURCE,
    );
    if let Err(e) = publish(&state.redis_client, &evt).await {
        tracing::warn!("failed to publish {}: {:?}", evt.event_type.as_str(), e);
    }
}

pub(crate) async fn publish(client: &redis::Client, evt: &BillingEventEnvelope) -> anyhow::Result<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let payload = serde_json::to_string(evt)?;
    conn.publish::<_, _, ()>(CHANNEL_BILLING_EVENTS, payload).await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/servers/{id}/payments",
    tag = "Payments",
    responses(
        (status = 200, description = "Monthly invoices of the server", body = Vec<PagoMensual>),
        (status = 404, description = "Server not found")
    )
)]
pub async fn list_server_payments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<PagoMensual>>> {
    fetch_visible_server(&state, &user, id).await?;
    let sql = format!(
        "SELECT {} FROM pagos_mensuales WHERE server_id = $1 ORDER BY anio DESC, mes DESC, created_at",
        PAYMENT_COLUMNS
    );
    let rows = sqlx::query_as::<Postgres, PagoMensual>(&sql)
        .bind(id)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arriendo_common::{Connectivity, DiskType};
    use bigdecimal::BigDecimal;

    fn server(estado: ServerStatus) -> Server {
        Server {
            id: Uuid::new_v4(),
            nombre: "web-01".to_string(),
            cliente_id: None,
            region_id: Uuid::new_v4(),
            sistema_operativo_id: Uuid::new_v4(),
            imagen_id: Uuid::new_v4(),
            instance_type_id: Uuid::new_v4(),
            ram_gb: 2,
            disco_gb: 20,
            disco_tipo: DiskType::Ssd,
            conexion: Connectivity::Publica,
            clave_privada: None,
            estado,
            costo_diario: BigDecimal::from(1),
            first_activated_at: None,
            latest_release: None,
            accrual_started_at: None,
            active_seconds: 0,
            active_ms: 5_000,
            billed_active_ms: 2_000,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn listing_keeps_rows_with_inconsistent_accrual() {
        let ok = ServerView::lenient(server(ServerStatus::Stopped));
        assert_eq!(ok.effective_active_ms, Some(5_000));
        assert_eq!(ok.unbilled_ms, Some(3_000));

        // running without an accrual start
        let broken = server(ServerStatus::Running);
        assert!(ServerView::new(broken.clone()).is_err());
        let view = ServerView::lenient(broken);
        assert_eq!(view.effective_active_ms, None);
        assert_eq!(view.unbilled_ms, None);
    }
}
