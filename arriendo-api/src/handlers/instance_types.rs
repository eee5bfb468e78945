use axum::{
    extract::{Path, State},
    Extension, Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use sqlx::Postgres;
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::sizing::FieldError;
use arriendo_common::InstanceType;

use crate::app::AppState;
use crate::audit_log;
use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{fetch_instance_type, INSTANCE_TYPE_COLUMNS};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateInstanceTypeRequest {
    #[schema(value_type = Option<String>)]
    pub precio_hora: Option<BigDecimal>,
    #[schema(value_type = Option<String>)]
    pub memoria_gb: Option<BigDecimal>,
    pub rendimiento_red: Option<String>,
}

#[utoipa::path(
    get,
    path = "/instance_types",
    tag = "Catalog",
    responses((status = 200, description = "Instance type catalogue", body = Vec<InstanceType>))
)]
pub async fn list_instance_types(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<InstanceType>>> {
    let sql = format!("SELECT {} FROM instance_types ORDER BY familia, nombre", INSTANCE_TYPE_COLUMNS);
    let rows = sqlx::query_as::<Postgres, InstanceType>(&sql)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows))
}

/// Price changes only affect servers priced afterwards; existing servers keep
/// their `costo_diario`.
#[utoipa::path(
    put,
    path = "/instance_types/{id}",
    tag = "Catalog",
    request_body = UpdateInstanceTypeRequest,
    responses(
        (status = 200, description = "Instance type updated", body = InstanceType),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Instance type not found")
    )
)]
pub async fn update_instance_type(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInstanceTypeRequest>,
) -> ApiResult<Json<InstanceType>> {
    auth::require_admin(&user)?;

    let zero = BigDecimal::from(0);
    let mut errors = Vec::new();
    for (field, value) in [("precio_hora", &req.precio_hora), ("memoria_gb", &req.memoria_gb)] {
        if value.as_ref().is_some_and(|v| v < &zero) {
            errors.push(FieldError {
                field: field.to_string(),
                message: "must not be negative".to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let updated = sqlx::query(
        "UPDATE instance_types SET
            precio_hora = COALESCE($2, precio_hora),
            memoria_gb = COALESCE($3, memoria_gb),
            rendimiento_red = COALESCE($4, rendimiento_red)
         WHERE id = $1",
    )
    .bind(id)
    .bind(req.precio_hora.as_ref())
    .bind(req.memoria_gb.as_ref())
    .bind(req.rendimiento_red.as_deref())
    .execute(&state.db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("instance_type_not_found"));
    }

    let it = fetch_instance_type(&state.db, id).await?;
    audit_log::log_action(
        &state.db,
        "INSTANCE_TYPE_PRICE_UPDATED",
        None,
        serde_json::json!({"instance_type_id": id, "precio_hora": it.precio_hora.to_string(), "by": user.user_id}),
    )
    .await;
    Ok(Json(it))
}
