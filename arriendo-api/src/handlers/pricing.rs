use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use arriendo_common::pricing::{self, DesgloseCosto, TarifasVigentes};
use arriendo_common::sizing;
use arriendo_common::{Connectivity, DiskType};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::handlers::fetch_instance_type;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct EstimateRequest {
    pub instance_type_id: Uuid,
    pub ram_gb: i32,
    pub disco_gb: i32,
    pub disco_tipo: DiskType,
    pub conexion: Connectivity,
}

#[utoipa::path(
    get,
    path = "/pricing/rates",
    tag = "Pricing",
    responses((status = 200, description = "Rates in force", body = TarifasVigentes))
)]
pub async fn get_rates() -> Json<TarifasVigentes> {
    Json(pricing::tarifas_vigentes())
}

/// Cost preview. Uses the same formula that prices approved servers.
#[utoipa::path(
    post,
    path = "/pricing/estimate",
    tag = "Pricing",
    request_body = EstimateRequest,
    responses(
        (status = 200, description = "Daily cost breakdown", body = DesgloseCosto),
        (status = 404, description = "Unknown instance type"),
        (status = 422, description = "Invalid sizing")
    )
)]
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EstimateRequest>,
) -> ApiResult<Json<DesgloseCosto>> {
    let errors = sizing::validate_dimensions(req.ram_gb, req.disco_gb);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let instance_type = fetch_instance_type(&state.db, req.instance_type_id).await?;
    Ok(Json(pricing::desglose_costo_diario(
        &instance_type,
        req.ram_gb,
        req.disco_gb,
        req.disco_tipo,
        req.conexion,
    )))
}
