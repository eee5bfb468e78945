use arriendo_common::{ActiveInterval, PagoMensual};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use arriendo_common::store::PAYMENT_COLUMNS;
pub use arriendo_common::store::{
    insert_interval, insert_payment, lock_server, save_accrual, update_payment_usage,
};

pub async fn load_intervals(
    tx: &mut Transaction<'_, Postgres>,
    server_id: Uuid,
) -> Result<Vec<ActiveInterval>, sqlx::Error> {
    sqlx::query_as::<Postgres, ActiveInterval>(
        "SELECT server_id, started_at, ended_at
         FROM server_active_intervals
         WHERE server_id = $1
         ORDER BY ended_at DESC",
    )
    .bind(server_id)
    .fetch_all(&mut **tx)
    .await
}

/// Every invoice row of a server, locked.
pub async fn load_payments(
    tx: &mut Transaction<'_, Postgres>,
    server_id: Uuid,
) -> Result<Vec<PagoMensual>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM pagos_mensuales WHERE server_id = $1 ORDER BY anio, mes, created_at FOR UPDATE",
        PAYMENT_COLUMNS
    );
    sqlx::query_as::<Postgres, PagoMensual>(&sql)
        .bind(server_id)
        .fetch_all(&mut **tx)
        .await
}

/// Servers with unbilled time, or running (their open interval may be unbilled).
pub async fn billable_server_ids(db: &Pool<Postgres>) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM servers
         WHERE billed_active_ms < active_ms OR estado = 'running'
         ORDER BY id",
    )
    .fetch_all(db)
    .await
}

/// pendiente rows old enough to possibly be past due at `as_of`.
pub async fn pending_payments(
    db: &Pool<Postgres>,
    as_of: DateTime<Utc>,
) -> Result<Vec<PagoMensual>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM pagos_mensuales
         WHERE estado = 'pendiente' AND make_date(anio, mes, 1) < $1::date
         ORDER BY anio, mes",
        PAYMENT_COLUMNS
    );
    sqlx::query_as::<Postgres, PagoMensual>(&sql)
        .bind(as_of)
        .fetch_all(db)
        .await
}

/// pendiente -> vencido, never touching rows paid in the meantime.
pub async fn mark_payment_vencido(db: &Pool<Postgres>, payment_id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE pagos_mensuales SET estado = 'vencido' WHERE id = $1 AND estado = 'pendiente'",
    )
    .bind(payment_id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}
