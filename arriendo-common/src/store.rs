//! Row readers and writers shared by the API and the billing service.
//!
//! Writers take the open transaction so callers keep the lock/write order:
//! lock the server row with [`lock_server`], apply the domain change, then
//! persist it here before committing.

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{ActiveInterval, PagoMensual, Server};

pub const SERVER_COLUMNS: &str = "id, nombre, cliente_id, region_id, sistema_operativo_id, imagen_id, \
     instance_type_id, ram_gb, disco_gb, disco_tipo, conexion, clave_privada, estado, costo_diario, \
     first_activated_at, latest_release, accrual_started_at, active_seconds, active_ms, \
     billed_active_ms, created_at";

pub const PAYMENT_COLUMNS: &str =
    "id, server_id, anio, mes, monto, active_ms, estado, fecha_pago, observaciones, created_at";

/// Row-lock a server for the rest of the transaction.
pub async fn lock_server(
    tx: &mut Transaction<'_, Postgres>,
    server_id: Uuid,
) -> Result<Option<Server>, sqlx::Error> {
    let sql = format!("SELECT {} FROM servers WHERE id = $1 FOR UPDATE", SERVER_COLUMNS);
    sqlx::query_as::<Postgres, Server>(&sql)
        .bind(server_id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn lock_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: Uuid,
) -> Result<Option<PagoMensual>, sqlx::Error> {
    let sql = format!("SELECT {} FROM pagos_mensuales WHERE id = $1 FOR UPDATE", PAYMENT_COLUMNS);
    sqlx::query_as::<Postgres, PagoMensual>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn insert_interval(
    tx: &mut Transaction<'_, Postgres>,
    interval: &ActiveInterval,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO server_active_intervals (server_id, started_at, ended_at) VALUES ($1, $2, $3)",
    )
    .bind(interval.server_id)
    .bind(interval.started_at)
    .bind(interval.ended_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Persist the accrual fields touched by transitions, checkpoints and reconciliation.
///
/// The caller must hold the row lock taken by [`lock_server`].
pub async fn save_accrual(
    tx: &mut Transaction<'_, Postgres>,
    server: &Server,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE servers
         SET estado = $2,
             first_activated_at = $3,
             latest_release = $4,
             accrual_started_at = $5,
             active_seconds = $6,
             active_ms = $7,
             billed_active_ms = $8
         WHERE id = $1",
    )
    .bind(server.id)
    .bind(server.estado)
    .bind(server.first_activated_at)
    .bind(server.latest_release)
    .bind(server.accrual_started_at)
    .bind(server.active_seconds)
    .bind(server.active_ms)
    .bind(server.billed_active_ms)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &PagoMensual,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pagos_mensuales
         (id, server_id, anio, mes, monto, active_ms, estado, fecha_pago, observaciones, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(payment.id)
    .bind(payment.server_id)
    .bind(payment.anio)
    .bind(payment.mes)
    .bind(&payment.monto)
    .bind(payment.active_ms)
    .bind(payment.estado)
    .bind(payment.fecha_pago)
    .bind(&payment.observaciones)
    .bind(payment.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Write the amount and invoiced time of an open row. Returns false if the
/// row was paid meanwhile; paid rows are never rewritten.
pub async fn update_payment_usage(
    tx: &mut Transaction<'_, Postgres>,
    payment: &PagoMensual,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE pagos_mensuales SET monto = $2, active_ms = $3 WHERE id = $1 AND estado <> 'pagado'",
    )
    .bind(payment.id)
    .bind(&payment.monto)
    .bind(payment.active_ms)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Persist a registered payment (estado, fecha_pago, observaciones).
pub async fn save_payment_state(
    tx: &mut Transaction<'_, Postgres>,
    payment: &PagoMensual,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE pagos_mensuales SET estado = $2, fecha_pago = $3, observaciones = $4 WHERE id = $1",
    )
    .bind(payment.id)
    .bind(payment.estado)
    .bind(payment.fecha_pago)
    .bind(&payment.observaciones)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
