pub mod commands;
pub mod instance_types;
pub mod payments;
pub mod pricing;
pub mod requests;
pub mod servers;

use arriendo_common::InstanceType;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub(crate) const INSTANCE_TYPE_COLUMNS: &str =
    "id, nombre, familia, vcpus, procesador, memoria_gb, rendimiento_red, precio_hora";

pub(crate) const REQUEST_COLUMNS: &str = "id, cliente_id, nombre, region_id, sistema_operativo_id, imagen_id, \
     instance_type_id, ram_gb, disco_gb, disco_tipo, conexion, clave_privada, medio_pago, \
     costo_diario_estimado, estado, motivo_rechazo, revisado_por, revisado_at, created_at";

pub(crate) async fn fetch_instance_type<'e, E>(executor: E, id: Uuid) -> ApiResult<InstanceType>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM instance_types WHERE id = $1", INSTANCE_TYPE_COLUMNS);
    sqlx::query_as::<Postgres, InstanceType>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(ApiError::NotFound("instance_type_not_found"))
}
