use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use arriendo_common::sizing::FieldError;
use arriendo_common::BillingError;

/// Error returned by handlers, rendered as `{"error": code, "message": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Billing(BillingError),
    Validation(Vec<FieldError>),
    NotFound(&'static str),
    Forbidden(&'static str),
    Db(sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        ApiError::Billing(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Db(e)
    }
}

pub fn billing_status(e: &BillingError) -> StatusCode {
    match e {
        BillingError::InvalidTransition { .. }
        | BillingError::PaidInvoiceImmutable { .. }
        | BillingError::RequestAlreadyReviewed { .. } => StatusCode::CONFLICT,
        BillingError::MissingRejectionReason => StatusCode::UNPROCESSABLE_ENTITY,
        BillingError::InconsistentAccrualState { .. } | BillingError::ReconciliationSkipped { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Billing(e) => {
                if billing_status(&e).is_server_error() {
                    tracing::error!("billing invariant violated: {}", e);
                }
                (billing_status(&e), Json(json!({"error": e.code(), "message": e.to_string()})))
                    .into_response()
            }
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error":"validation_failed","message":"invalid_fields","fields": fields})),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error":"not_found","message": what})),
            )
                .into_response(),
            ApiError::Forbidden(what) => (
                StatusCode::FORBIDDEN,
                Json(json!({"error":"forbidden","message": what})),
            )
                .into_response(),
            ApiError::Db(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error":"db_error","message":"database_error"})),
                )
                    .into_response()
            }
        }
    }
}
