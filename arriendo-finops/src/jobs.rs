use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::{stream, StreamExt};
use sqlx::{Pool, Postgres};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use arriendo_common::bus::BillingEventType;
use arriendo_common::{BillingError, PagoMensual};

use crate::events;
use crate::logger;
use crate::reconciliation::{self, ChangeKind, ReconcileOutcome};
use crate::store;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("server {0} not found")]
    NotFound(Uuid),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Billing(e) => e.code(),
            ReconcileError::Db(_) => "database_error",
            ReconcileError::NotFound(_) => "not_found",
        }
    }
}

/// Reconcile one server inside a single transaction.
///
/// The server row and its invoice rows are locked with `FOR UPDATE`, so a
/// concurrent transition or reconciliation of the same server waits. Any
/// failure rolls back every change of this pass.
pub async fn reconcile_server(
    db: &Pool<Postgres>,
    server_id: Uuid,
    as_of: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut tx = db.begin().await?;

    let mut server = store::lock_server(&mut tx, server_id)
        .await?
        .ok_or(ReconcileError::NotFound(server_id))?;
    let intervals = store::load_intervals(&mut tx, server_id).await?;
    let mut payments = store::load_payments(&mut tx, server_id).await?;

    let outcome = reconciliation::reconcile(&mut server, &intervals, &mut payments, as_of)?;
    if outcome.is_noop() {
        tx.rollback().await?;
        return Ok(outcome);
    }

    if let Some(iv) = &outcome.checkpoint {
        store::insert_interval(&mut tx, iv).await?;
    }
    for change in &outcome.changes {
        match change.kind {
            ChangeKind::Created => store::insert_payment(&mut tx, &change.payment).await?,
            ChangeKind::Updated => {
                if !store::update_payment_usage(&mut tx, &change.payment).await? {
                    return Err(BillingError::PaidInvoiceImmutable {
                        payment_id: change.payment.id,
                    }
                    .into());
                }
            }
        }
    }
    store::save_accrual(&mut tx, &server).await?;
    tx.commit().await?;

    if outcome.uncovered_ms > 0 {
        warn!(
            %server_id,
            uncovered_ms = outcome.uncovered_ms,
            "unbilled time not backed by running intervals; attributed to the oldest covered month"
        );
    }
    Ok(outcome)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub changed: usize,
    pub skipped: Vec<(Uuid, String)>,
    /// Invoices created or updated, for event publication.
    pub touched_payments: usize,
}

/// Reconcile every billable server with bounded concurrency.
///
/// A server that fails is logged as skipped and the batch moves on.
pub async fn reconcile_all(
    db: &Pool<Postgres>,
    redis_client: Option<&redis::Client>,
    as_of: DateTime<Utc>,
    concurrency: usize,
) -> Result<BatchReport, sqlx::Error> {
    let ids = store::billable_server_ids(db).await?;
    info!("reconciling {} servers as of {}", ids.len(), as_of);

    let pool = db.clone();
    let results: Vec<(Uuid, Result<ReconcileOutcome, ReconcileError>)> = stream::iter(ids)
        .map(move |id| {
            let pool = pool.clone();
            async move { (id, reconcile_server(&pool, id, as_of).await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::default();
    for (server_id, result) in results {
        report.processed += 1;
        match result {
            Ok(outcome) => {
                if outcome.is_noop() {
                    continue;
                }
                report.changed += 1;
                report.touched_payments += outcome.changes.len();
                publish_changes(redis_client, &outcome).await;
                logger::log_quick(
                    db,
                    "RECONCILE_SERVER",
                    "success",
                    Some(server_id),
                    Some(outcome_metadata(&outcome)),
                )
                .await;
            }
            Err(e) => {
                let skipped = BillingError::ReconciliationSkipped {
                    server_id,
                    reason: e.to_string(),
                };
                warn!("{}", skipped);
                if let Err(log_err) = logger::log_event(
                    db,
                    "RECONCILE_SERVER",
                    "skipped",
                    Some(server_id),
                    Some(e.code()),
                    Some(&e.to_string()),
                    None,
                )
                .await
                {
                    warn!("billing log not written: {}", log_err);
                }
                report.skipped.push((server_id, e.to_string()));
            }
        }
    }

    info!(
        processed = report.processed,
        changed = report.changed,
        skipped = report.skipped.len(),
        "reconciliation batch done"
    );
    Ok(report)
}

pub async fn publish_changes(redis_client: Option<&redis::Client>, outcome: &ReconcileOutcome) {
    for change in &outcome.changes {
        events::emit(
            redis_client,
            events::invoice_event(BillingEventType::InvoiceUpserted, &change.payment),
        )
        .await;
    }
}

pub fn outcome_metadata(outcome: &ReconcileOutcome) -> serde_json::Value {
    serde_json::json!({
        "consumed_ms": outcome.consumed_ms,
        "uncovered_ms": outcome.uncovered_ms,
        "checkpointed": outcome.checkpoint.is_some(),
        "changes": outcome.changes,
    })
}

/// Move every past-due pendiente invoice to vencido. Returns the rows changed.
pub async fn sweep_overdue(
    db: &Pool<Postgres>,
    redis_client: Option<&redis::Client>,
    as_of: DateTime<Utc>,
    grace_days: i64,
) -> Result<Vec<PagoMensual>, sqlx::Error> {
    let mut candidates = store::pending_payments(db, as_of).await?;
    let due: Vec<Uuid> = reconciliation::mark_overdue(&mut candidates, as_of, grace_days);

    let mut changed = Vec::new();
    for payment in candidates.into_iter().filter(|p| due.contains(&p.id)) {
        // The row may have been paid since it was read.
        if !store::mark_payment_vencido(db, payment.id).await? {
            continue;
        }
        events::emit(
            redis_client,
            events::invoice_event(BillingEventType::InvoiceOverdue, &payment),
        )
        .await;
        logger::log_quick(
            db,
            "INVOICE_OVERDUE",
            "success",
            Some(payment.server_id),
            Some(serde_json::json!({"payment_id": payment.id, "anio": payment.anio, "mes": payment.mes})),
        )
        .await;
        changed.push(payment);
    }
    if !changed.is_empty() {
        info!("{} invoices marked vencido", changed.len());
    }
    Ok(changed)
}

/// Next occurrence of `hour`:00 UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub async fn sleep_until_next_run(hour: u32) {
    let now = Utc::now();
    let delta = (next_run_after(now, hour) - now)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60 * 60));
    tokio::time::sleep(delta).await;
}

/// One nightly pass: reconcile everything, then flag overdue invoices.
pub async fn run_nightly(
    db: &Pool<Postgres>,
    redis_client: Option<&redis::Client>,
    grace_days: i64,
    concurrency: usize,
) -> anyhow::Result<()> {
    let as_of = Utc::now();
    let started = std::time::Instant::now();
    let log_id = logger::log_event(db, "NIGHTLY_RECONCILE", "in_progress", None, None, None, None).await?;

    let report = reconcile_all(db, redis_client, as_of, concurrency).await?;
    let overdue = sweep_overdue(db, redis_client, as_of, grace_days).await?;

    let status = if report.skipped.is_empty() { "success" } else { "partial" };
    logger::log_event_complete(
        db,
        log_id,
        status,
        started.elapsed().as_millis().min(i32::MAX as u128) as i32,
        Some(serde_json::json!({
            "processed": report.processed,
            "changed": report.changed,
            "skipped": report.skipped.len(),
            "overdue": overdue.len(),
        })),
    )
    .await?;
    Ok(())
}
