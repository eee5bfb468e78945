use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::bus::{BillingEventEnvelope, BillingEventType};
use arriendo_common::sizing::FieldError;
use arriendo_common::store;
use arriendo_common::PagoMensual;

use crate::app::AppState;
use crate::audit_log;
use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::handlers::servers::{fetch_visible_server, publish, EVENT_SOURCE};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreatePaymentRequest {
    pub anio: i32,
    pub mes: i32,
    #[schema(value_type = String)]
    pub monto: BigDecimal,
    pub observaciones: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct RegisterPaymentRequest {
    pub observaciones: Option<String>,
}

pub fn validate_manual_payment(req: &CreatePaymentRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !(1..=12).contains(&req.mes) {
        errors.push(FieldError {
            field: "mes".to_string(),
            message: "must be between 1 and 12".to_string(),
        });
    }
    if !(2000..=9999).contains(&req.anio) {
        errors.push(FieldError {
            field: "anio".to_string(),
            message: "must be between 2000 and 9999".to_string(),
        });
    }
    if req.monto < BigDecimal::from(0) {
        errors.push(FieldError {
            field: "monto".to_string(),
            message: "must not be negative".to_string(),
        });
    }
    errors
}

/// Operator-created invoice row (always pendiente).
#[utoipa::path(
    post,
    path = "/servers/{id}/payments",
    tag = "Payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Invoice created", body = PagoMensual),
        (status = 403, description = "Operator only"),
        (status = 404, description = "Server not found"),
        (status = 422, description = "Invalid period or amount")
    )
)]
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(server_id): Path<Uuid>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<PagoMensual>)> {
    auth::require_operator(&user)?;
    let errors = validate_manual_payment(&req);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    fetch_visible_server(&state, &user, server_id).await?;

    let pago = PagoMensual::new_pendiente(
        server_id,
        req.anio,
        req.mes,
        req.monto,
        req.observaciones,
        Utc::now(),
    );
    let mut tx = state.db.begin().await?;
    store::insert_payment(&mut tx, &pago).await?;
    tx.commit().await?;

    audit_log::log_action(
        &state.db,
        "PAYMENT_CREATED",
        Some(server_id),
        serde_json::json!({"payment_id": pago.id, "anio": pago.anio, "mes": pago.mes, "monto": pago.monto.to_string(), "by": user.user_id}),
    )
    .await;
    Ok((StatusCode::CREATED, Json(pago)))
}

#[utoipa::path(
    post,
    path = "/payments/{id}/pay",
    tag = "Payments",
    request_body = RegisterPaymentRequest,
    responses(
        (status = 200, description = "Payment registered", body = PagoMensual),
        (status = 403, description = "Operator only"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already registered")
    )
)]
pub async fn register_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<RegisterPaymentRequest>>,
) -> ApiResult<Json<PagoMensual>> {
    auth::require_operator(&user)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let mut tx = state.db.begin().await?;
    let mut pago = store::lock_payment(&mut tx, id)
        .await?
        .ok_or(ApiError::NotFound("payment_not_found"))?;

    pago.register_payment(Utc::now(), body.observaciones)?;
    store::save_payment_state(&mut tx, &pago).await?;
    tx.commit().await?;

    tracing::info!(payment_id = %pago.id, server_id = %pago.server_id, anio = pago.anio, mes = pago.mes, "payment registered");
    let evt = BillingEventEnvelope::new(
        BillingEventType::InvoicePaid,
        Utc::now(),
        serde_json::json!({
            "server_id": pago.server_id.to_string(),
            "payment_id": pago.id.to_string(),
            "anio": pago.anio,
            "mes": pago.mes,
            "monto": pago.monto.to_string(),
        }),
        EVENT_SOURCE,
    );
    if let Err(e) = publish(&state.redis_client, &evt).await {
        tracing::warn!("failed to publish {}: {:?}", evt.event_type.as_str(), e);
    }
    audit_log::log_action(
        &state.db,
        "PAYMENT_REGISTERED",
        Some(pago.server_id),
        serde_json::json!({"payment_id": pago.id, "by": user.user_id}),
    )
    .await;
    Ok(Json(pago))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn req(anio: i32, mes: i32, monto: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            anio,
            mes,
            monto: BigDecimal::from_str(monto).unwrap(),
            observaciones: None,
        }
    }

    #[test]
    fn manual_payment_validation() {
        assert!(validate_manual_payment(&req(2024, 12, "10.5")).is_empty());
        let fields: Vec<String> = validate_manual_payment(&req(1999, 13, "-1"))
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["mes", "anio", "monto"]);
    }
}
