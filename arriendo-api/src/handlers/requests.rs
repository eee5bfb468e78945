use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::{approval, sizing};
use arriendo_common::{PaymentMethod, RequestStatus, Server, ServerSizing, SolicitudServidor};

use crate::app::AppState;
use crate::audit_log;
use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{fetch_instance_type, REQUEST_COLUMNS};
use crate::rbac;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateRequestBody {
    #[serde(flatten)]
    pub sizing: ServerSizing,
    pub medio_pago: PaymentMethod,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRequestsParams {
    pub estado: Option<RequestStatus>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RejectRequestBody {
    pub motivo_rechazo: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApproveResponse {
    pub solicitud: SolicitudServidor,
    pub server: Server,
}

#[utoipa::path(
    post,
    path = "/requests",
    tag = "Requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request created with a frozen estimate", body = SolicitudServidor),
        (status = 404, description = "Unknown instance type"),
        (status = 422, description = "Invalid sizing")
    )
)]
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<(StatusCode, Json<SolicitudServidor>)> {
    let errors = sizing::validate_sizing(&body.sizing);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let instance_type = fetch_instance_type(&state.db, body.sizing.instance_type_id).await?;
    let solicitud = approval::draft_request(
        body.sizing,
        &instance_type,
        body.medio_pago,
        Some(user.user_id),
        Utc::now(),
    );

    sqlx::query(
        "INSERT INTO solicitudes_servidor
         (id, cliente_id, nombre, region_id, sistema_operativo_id, imagen_id, instance_type_id,
          ram_gb, disco_gb, disco_tipo, conexion, clave_privada, medio_pago, costo_diario_estimado,
          estado, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(solicitud.id)
    .bind(solicitud.cliente_id)
    .bind(&solicitud.nombre)
    .bind(solicitud.region_id)
    .bind(solicitud.sistema_operativo_id)
    .bind(solicitud.imagen_id)
    .bind(solicitud.instance_type_id)
    .bind(solicitud.ram_gb)
    .bind(solicitud.disco_gb)
    .bind(solicitud.disco_tipo)
    .bind(solicitud.conexion)
    .bind(&solicitud.clave_privada)
    .bind(solicitud.medio_pago)
    .bind(&solicitud.costo_diario_estimado)
    .bind(solicitud.estado)
    .bind(solicitud.created_at)
    .execute(&state.db)
    .await?;

    tracing::info!(request_id = %solicitud.id, costo = %solicitud.costo_diario_estimado, "server request created");
    Ok((StatusCode::CREATED, Json(solicitud)))
}

#[utoipa::path(
    get,
    path = "/requests",
    tag = "Requests",
    params(ListRequestsParams),
    responses((status = 200, description = "Requests visible to the caller", body = Vec<SolicitudServidor>))
)]
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListRequestsParams>,
) -> ApiResult<Json<Vec<SolicitudServidor>>> {
    let own_only = if rbac::can_operate(user.role) { None } else { Some(user.user_id) };
    let sql = format!(
        "SELECT {} FROM solicitudes_servidor
         WHERE ($1::request_status IS NULL OR estado = $1)
           AND ($2::uuid IS NULL OR cliente_id = $2)
         ORDER BY created_at DESC",
        REQUEST_COLUMNS
    );
    let rows = sqlx::query_as::<Postgres, SolicitudServidor>(&sql)
        .bind(params.estado)
        .bind(own_only)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows))
}

async fn lock_request(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> ApiResult<SolicitudServidor> {
    let sql = format!("SELECT {} FROM solicitudes_servidor WHERE id = $1 FOR UPDATE", REQUEST_COLUMNS);
    sqlx::query_as::<Postgres, SolicitudServidor>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ApiError::NotFound("request_not_found"))
}

async fn save_review(tx: &mut Transaction<'_, Postgres>, s: &SolicitudServidor) -> ApiResult<()> {
    sqlx::query(
        "UPDATE solicitudes_servidor
         SET estado = $2, motivo_rechazo = $3, revisado_por = $4, revisado_at = $5
         WHERE id = $1",
    )
    .bind(s.id)
    .bind(s.estado)
    .bind(&s.motivo_rechazo)
    .bind(s.revisado_por)
    .bind(s.revisado_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "Requests",
    responses(
        (status = 200, description = "Request approved, server created", body = ApproveResponse),
        (status = 403, description = "Operator only"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already reviewed")
    )
)]
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApproveResponse>> {
    auth::require_operator(&user)?;

    let mut tx = state.db.begin().await?;
    let mut solicitud = lock_request(&mut tx, id).await?;
    let instance_type = fetch_instance_type(&mut *tx, solicitud.instance_type_id).await?;
    let server = approval::approve(&mut solicitud, &instance_type, user.user_id, Utc::now())?;

    sqlx::query(
        "INSERT INTO servers
         (id, nombre, cliente_id, region_id, sistema_operativo_id, imagen_id, instance_type_id,
          ram_gb, disco_gb, disco_tipo, conexion, clave_privada, estado, costo_diario, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(server.id)
    .bind(&server.nombre)
    .bind(server.cliente_id)
    .bind(server.region_id)
    .bind(server.sistema_operativo_id)
    .bind(server.imagen_id)
    .bind(server.instance_type_id)
    .bind(server.ram_gb)
    .bind(server.disco_gb)
    .bind(server.disco_tipo)
    .bind(server.conexion)
    .bind(&server.clave_privada)
    .bind(server.estado)
    .bind(&server.costo_diario)
    .bind(server.created_at)
    .execute(&mut *tx)
    .await?;
    save_review(&mut tx, &solicitud).await?;
    tx.commit().await?;

    audit_log::log_action(
        &state.db,
        "REQUEST_APPROVED",
        Some(server.id),
        serde_json::json!({"request_id": id, "costo_diario": server.costo_diario.to_string(), "by": user.user_id}),
    )
    .await;
    Ok(Json(ApproveResponse { solicitud, server }))
}

#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "Requests",
    request_body = RejectRequestBody,
    responses(
        (status = 200, description = "Request rejected", body = SolicitudServidor),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already reviewed"),
        (status = 422, description = "Missing rejection reason")
    )
)]
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequestBody>,
) -> ApiResult<Json<SolicitudServidor>> {
    auth::require_operator(&user)?;

    let mut tx = state.db.begin().await?;
    let mut solicitud = lock_request(&mut tx, id).await?;
    approval::reject(&mut solicitud, user.user_id, &body.motivo_rechazo, Utc::now())?;
    save_review(&mut tx, &solicitud).await?;
    tx.commit().await?;

    audit_log::log_action(
        &state.db,
        "REQUEST_REJECTED",
        None,
        serde_json::json!({"request_id": id, "by": user.user_id}),
    )
    .await;
    Ok(Json(solicitud))
}
