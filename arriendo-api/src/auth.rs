use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::rbac::{self, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity forwarded by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub role: Role,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn extract_user(headers: &HeaderMap) -> Option<AuthUser> {
    let user_id = uuid::Uuid::parse_str(header_str(headers, USER_ID_HEADER)?).ok()?;
    let role = Role::parse(header_str(headers, USER_ROLE_HEADER)?)?;
    Some(AuthUser { user_id, role })
}

pub async fn require_user(mut req: Request<Body>, next: Next) -> Response {
    let Some(user) = extract_user(req.headers()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"unauthorized","message":"identity_headers_required"})),
        )
            .into_response();
    };
    req.extensions_mut().insert(user);
    next.run(req).await
}

pub fn require_operator(user: &AuthUser) -> ApiResult<()> {
    if rbac::can_operate(user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("operator_required"))
    }
}

pub fn require_admin(user: &AuthUser) -> ApiResult<()> {
    if rbac::can_manage_catalog(user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin_required"))
    }
}
