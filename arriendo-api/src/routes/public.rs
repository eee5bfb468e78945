// Public routes (no identity headers required)
use crate::app::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_docs;
use crate::handlers::pricing;
use crate::version;

pub fn create_public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api_docs::ApiDoc::openapi()),
        )
        .route("/", get(root))
        .route("/version", get(get_version))
        .route("/pricing/rates", get(pricing::get_rates))
        .route("/pricing/estimate", post(pricing::estimate))
}

async fn get_version() -> axum::Json<version::VersionInfo> {
    axum::Json(version::get_version_info())
}

async fn root() -> &'static str {
    "Arriendo Billing API"
}
