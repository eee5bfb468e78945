//! Monthly invoice reconciliation.
//!
//! Billed time is always a prefix of a server's cumulative active time, so the
//! unbilled part is the most recent `active_ms - billed_active_ms` of running
//! time. That window is located on the persisted running intervals, split at
//! month boundaries and priced at the server's `costo_diario`.
//!
//! Every invoice row records the active time it covers. A period's total is
//! the rounded price of its cumulative time, so the number of passes never
//! changes what is billed.

use std::collections::BTreeMap;

use arriendo_common::accrual;
use arriendo_common::{ActiveInterval, BillingError, PagoMensual, PaymentStatus, Server};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::billing_period::{amount_for_ms, due_date, period_of, split_by_month, Period};

/// Note stored on a row created for a period that was already paid.
pub const NOTA_AJUSTE_POST_PAGO: &str = "Ajuste por uso posterior al pago del periodo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceChange {
    pub kind: ChangeKind,
    /// State of the row after this pass.
    pub payment: PagoMensual,
    pub contribution_ms: i64,
    pub added: BigDecimal,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub changes: Vec<InvoiceChange>,
    /// Unbilled time consumed by this pass.
    pub consumed_ms: i64,
    /// Part of `consumed_ms` not backed by any running interval.
    pub uncovered_ms: i64,
    /// Interval closed by checkpointing a running server; must be persisted.
    pub checkpoint: Option<ActiveInterval>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.consumed_ms == 0 && self.checkpoint.is_none()
    }
}

/// Attribute the newest `unbilled_ms` of running time to calendar months.
///
/// Returns the per-period milliseconds and how much could not be located on
/// `intervals` (that remainder goes to the oldest covered instant's month, or
/// to `fallback`'s month when nothing was covered).
pub fn attribute_unbilled(
    intervals: &[ActiveInterval],
    unbilled_ms: i64,
    fallback: DateTime<Utc>,
) -> (BTreeMap<Period, i64>, i64) {
    let mut per_period: BTreeMap<Period, i64> = BTreeMap::new();
    let mut remaining = unbilled_ms;
    let mut oldest: Option<DateTime<Utc>> = None;

    let mut newest_first: Vec<&ActiveInterval> = intervals.iter().collect();
    newest_first.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));

    for iv in newest_first {
        if remaining <= 0 {
            break;
        }
        let take = iv.duration_ms().min(remaining);
        if take == 0 {
            continue;
        }
        let from = iv.ended_at - Duration::milliseconds(take);
        for (period, ms) in split_by_month(from, iv.ended_at) {
            *per_period.entry(period).or_insert(0) += ms;
        }
        remaining -= take;
        oldest = Some(from);
    }

    if remaining > 0 {
        let anchor = period_of(oldest.unwrap_or(fallback));
        *per_period.entry(anchor).or_insert(0) += remaining;
    }
    (per_period, remaining.max(0))
}

/// Open row to accumulate into: pendiente first, then vencido, oldest first.
fn open_invoice_index(payments: &[PagoMensual], period: Period) -> Option<usize> {
    payments
        .iter()
        .enumerate()
        .filter(|(_, p)| p.period() == period && !p.is_paid())
        .min_by_key(|(_, p)| (p.estado != PaymentStatus::Pendiente, p.created_at))
        .map(|(i, _)| i)
}

/// Active time already invoiced for `period`, paid rows included.
fn invoiced_ms(payments: &[PagoMensual], period: Period) -> i64 {
    payments
        .iter()
        .filter(|p| p.period() == period)
        .map(|p| p.active_ms)
        .sum()
}

/// Convert the server's unbilled active time into invoice amounts as of `as_of`.
///
/// `payments` holds every invoice row of this server and is updated in place
/// (new rows are appended). Paid rows are never modified: usage landing in a
/// paid period opens a correction row for that period. Time whose amount
/// still rounds to zero is recorded on a row anyway and priced once more
/// time accumulates. On success `billed_active_ms` has advanced by exactly
/// `consumed_ms`.
///
/// An `as_of` earlier than the open interval's start (clock skew between
/// hosts) is treated as that start.
pub fn reconcile(
    server: &mut Server,
    intervals: &[ActiveInterval],
    payments: &mut Vec<PagoMensual>,
    as_of: DateTime<Utc>,
) -> Result<ReconcileOutcome, BillingError> {
    accrual::check_consistency(server)?;
    if let Some(foreign) = payments.iter().find(|p| p.server_id != server.id) {
        return Err(BillingError::ReconciliationSkipped {
            server_id: server.id,
            reason: format!("payment {} belongs to another server", foreign.id),
        });
    }

    let as_of = match server.accrual_started_at {
        Some(start) if start > as_of => start,
        _ => as_of,
    };
    let checkpoint = accrual::checkpoint(server, as_of)?;
    let mut outcome = ReconcileOutcome {
        checkpoint: checkpoint.clone(),
        ..Default::default()
    };

    let unbilled_ms = server.active_ms - server.billed_active_ms;
    if unbilled_ms <= 0 {
        return Ok(outcome);
    }

    let mut covered: Vec<ActiveInterval> = intervals
        .iter()
        .filter(|iv| iv.server_id == server.id)
        .cloned()
        .collect();
    covered.extend(checkpoint);

    let (per_period, uncovered_ms) = attribute_unbilled(&covered, unbilled_ms, as_of);

    for (period, contribution_ms) in per_period {
        let before_ms = invoiced_ms(payments, period);
        let added = amount_for_ms(before_ms + contribution_ms, &server.costo_diario)
            - amount_for_ms(before_ms, &server.costo_diario);

        let change = match open_invoice_index(payments, period) {
            Some(i) => {
                payments[i].add_usage(contribution_ms, &added)?;
                InvoiceChange {
                    kind: ChangeKind::Updated,
                    payment: payments[i].clone(),
                    contribution_ms,
                    added,
                }
            }
            None => {
                let paid_before = payments.iter().any(|p| p.period() == period && p.is_paid());
                let nota = paid_before.then(|| NOTA_AJUSTE_POST_PAGO.to_string());
                let mut row = PagoMensual::new_pendiente(
                    server.id,
                    period.0,
                    period.1,
                    added.clone(),
                    nota,
                    as_of,
                );
                row.active_ms = contribution_ms;
                payments.push(row.clone());
                InvoiceChange {
                    kind: ChangeKind::Created,
                    payment: row,
                    contribution_ms,
                    added,
                }
            }
        };
        outcome.changes.push(change);
    }

    server.billed_active_ms += unbilled_ms;
    outcome.consumed_ms = unbilled_ms;
    outcome.uncovered_ms = uncovered_ms;
    Ok(outcome)
}

/// A pendiente invoice is overdue once its due date has passed. Rows that owe
/// nothing yet are never overdue.
pub fn is_overdue(payment: &PagoMensual, as_of: DateTime<Utc>, grace_days: i64) -> bool {
    if payment.estado != PaymentStatus::Pendiente || payment.monto <= BigDecimal::from(0) {
        return false;
    }
    match due_date(payment.period(), grace_days) {
        Some(due) => as_of >= due,
        None => false,
    }
}

/// pendiente -> vencido for every overdue row. Returns the ids that changed.
pub fn mark_overdue(payments: &mut [PagoMensual], as_of: DateTime<Utc>, grace_days: i64) -> Vec<Uuid> {
    let mut changed = Vec::new();
    for p in payments.iter_mut() {
        if is_overdue(p, as_of, grace_days) && p.mark_vencido() {
            changed.push(p.id);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use arriendo_common::accrual::transition;
    use arriendo_common::{Connectivity, DiskType, ServerStatus};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    /// 2.4 per day is 0.1 per hour, which keeps expected amounts readable.
    fn server() -> Server {
        Server {
            id: Uuid::new_v4(),
            nombre: "web-01".to_string(),
            cliente_id: Some(Uuid::new_v4()),
            region_id: Uuid::new_v4(),
            sistema_operativo_id: Uuid::new_v4(),
            imagen_id: Uuid::new_v4(),
            instance_type_id: Uuid::new_v4(),
            ram_gb: 2,
            disco_gb: 20,
            disco_tipo: DiskType::Ssd,
            conexion: Connectivity::Publica,
            clave_privada: None,
            estado: ServerStatus::Pending,
            costo_diario: dec("2.4"),
            first_activated_at: None,
            latest_release: None,
            accrual_started_at: None,
            active_seconds: 0,
            active_ms: 0,
            billed_active_ms: 0,
            created_at: at(2024, 1, 1, 0),
        }
    }

    /// Drive transitions and keep the closed intervals, as the store would.
    struct Harness {
        server: Server,
        intervals: Vec<ActiveInterval>,
        payments: Vec<PagoMensual>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                server: server(),
                intervals: Vec::new(),
                payments: Vec::new(),
            }
        }

        fn go(&mut self, to: ServerStatus, when: DateTime<Utc>) {
            let out = transition(&mut self.server, to, when).unwrap();
            self.intervals.extend(out.closed_interval);
        }

        fn reconcile(&mut self, as_of: DateTime<Utc>) -> ReconcileOutcome {
            let out = reconcile(&mut self.server, &self.intervals, &mut self.payments, as_of).unwrap();
            self.intervals.extend(out.checkpoint.clone());
            out
        }

        fn monto(&self, period: Period) -> BigDecimal {
            self.payments
                .iter()
                .filter(|p| p.period() == period)
                .fold(BigDecimal::from(0), |acc, p| acc + &p.monto)
        }
    }

    #[test]
    fn month_end_run_is_split_between_periods() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 1, 31, 23));
        h.go(ServerStatus::Stopped, at(2024, 2, 1, 1));

        let out = h.reconcile(at(2024, 2, 2, 0));
        assert_eq!(out.consumed_ms, 2 * 3_600_000);
        assert_eq!(out.uncovered_ms, 0);
        assert_eq!(out.changes.len(), 2);
        assert!(out.changes.iter().all(|c| c.kind == ChangeKind::Created));
        assert_eq!(h.monto((2024, 1)), dec("0.1"));
        assert_eq!(h.monto((2024, 2)), dec("0.1"));
        assert_eq!(h.server.billed_active_ms, h.server.active_ms);
    }

    #[test]
    fn second_pass_without_changes_is_noop() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 3, 1, 0));
        h.go(ServerStatus::Stopped, at(2024, 3, 2, 0));
        h.reconcile(at(2024, 3, 3, 0));
        let rows = h.payments.len();
        let billed = h.server.billed_active_ms;

        let again = h.reconcile(at(2024, 3, 3, 0));
        assert!(again.is_noop());
        assert!(again.changes.is_empty());
        assert_eq!(h.payments.len(), rows);
        assert_eq!(h.server.billed_active_ms, billed);
    }

    #[test]
    fn running_server_is_checkpointed_and_accumulates_into_open_row() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 3, 1, 0));

        let first = h.reconcile(at(2024, 3, 11, 0));
        assert!(first.checkpoint.is_some());
        assert_eq!(h.monto((2024, 3)), dec("24"));
        assert_eq!(h.server.active_ms, 10 * 86_400_000);
        assert!(h.server.billed_active_ms <= h.server.active_ms);

        let second = h.reconcile(at(2024, 3, 21, 0));
        assert_eq!(second.changes.len(), 1);
        assert_eq!(second.changes[0].kind, ChangeKind::Updated);
        assert_eq!(h.payments.len(), 1);
        assert_eq!(h.monto((2024, 3)), dec("48"));
        assert_eq!(h.server.billed_active_ms, h.server.active_ms);
    }

    #[test]
    fn paid_invoice_is_never_modified() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 5, 1, 0));
        h.reconcile(at(2024, 5, 11, 0));
        h.payments[0].register_payment(at(2024, 5, 12, 0), None).unwrap();
        let paid = h.payments[0].clone();

        let out = h.reconcile(at(2024, 5, 16, 0));
        assert_eq!(h.payments[0], paid);
        assert_eq!(out.changes.len(), 1);
        let correction = &out.changes[0];
        assert_eq!(correction.kind, ChangeKind::Created);
        assert_eq!(correction.payment.period(), (2024, 5));
        assert_eq!(correction.payment.estado, PaymentStatus::Pendiente);
        assert_eq!(correction.payment.observaciones.as_deref(), Some(NOTA_AJUSTE_POST_PAGO));
        assert_eq!(correction.payment.monto, dec("12"));
    }

    #[test]
    fn overdue_row_keeps_accumulating_until_paid() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 1, 30, 0));
        h.go(ServerStatus::Stopped, at(2024, 1, 31, 0));
        h.reconcile(at(2024, 2, 1, 0));
        assert_eq!(mark_overdue(&mut h.payments, at(2024, 2, 11, 0), 10).len(), 1);

        // Usage reported late for the January run.
        h.server.active_ms += 3_600_000;
        let out = h.reconcile(at(2024, 2, 12, 0));
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].kind, ChangeKind::Updated);
        assert_eq!(out.changes[0].payment.estado, PaymentStatus::Vencido);
        assert_eq!(h.monto((2024, 1)), dec("2.5"));
    }

    #[test]
    fn legacy_time_without_intervals_lands_in_current_month() {
        let mut h = Harness::new();
        h.server.estado = ServerStatus::Stopped;
        h.server.active_ms = 10 * 3_600_000;

        let out = h.reconcile(at(2024, 4, 15, 0));
        assert_eq!(out.uncovered_ms, 10 * 3_600_000);
        assert_eq!(out.consumed_ms, 10 * 3_600_000);
        assert_eq!(h.monto((2024, 4)), dec("1"));
        assert_eq!(h.server.billed_active_ms, h.server.active_ms);
    }

    #[test]
    fn tiny_contribution_is_recorded_on_a_row() {
        let mut h = Harness::new();
        h.server.estado = ServerStatus::Stopped;
        h.server.active_ms = 1;

        let out = h.reconcile(at(2024, 4, 15, 0));
        assert_eq!(out.consumed_ms, 1);
        assert_eq!(out.changes.len(), 1);
        assert_eq!(h.payments.len(), 1);
        assert_eq!(h.payments[0].active_ms, 1);
        assert_eq!(h.monto((2024, 4)), dec("0"));
        assert_eq!(h.server.billed_active_ms, 1);
        assert!(mark_overdue(&mut h.payments, at(2024, 6, 1, 0), 10).is_empty());

        // The rest of the hour completes the priced amount on the same row.
        h.server.active_ms = 3_600_000;
        h.reconcile(at(2024, 4, 16, 0));
        assert_eq!(h.payments.len(), 1);
        assert_eq!(h.payments[0].active_ms, 3_600_000);
        assert_eq!(h.monto((2024, 4)), dec("0.1"));
    }

    #[test]
    fn frequent_passes_bill_the_same_as_one_pass() {
        // 1 s rounds down to 0.0000 per pass and 1.8 s rounds up to 0.0001.
        for step_ms in [1_000, 1_800] {
            let start = at(2024, 4, 1, 0);
            let end = start + Duration::hours(1);

            let mut frequent = Harness::new();
            frequent.go(ServerStatus::Running, start);
            let mut when = start;
            while when < end {
                when += Duration::milliseconds(step_ms);
                frequent.reconcile(when);
            }

            let mut single = Harness::new();
            single.go(ServerStatus::Running, start);
            single.reconcile(end);

            assert_eq!(frequent.server.billed_active_ms, 3_600_000);
            assert_eq!(frequent.payments.len(), 1);
            assert_eq!(frequent.monto((2024, 4)), dec("0.1"));
            assert_eq!(frequent.monto((2024, 4)), single.monto((2024, 4)));
        }
    }

    #[test]
    fn correction_row_prices_the_cumulative_period_time() {
        let mut h = Harness::new();
        h.server.estado = ServerStatus::Stopped;
        // 0.00005 rounds up to 0.0001 on the first row.
        h.server.active_ms = 1_800;
        h.reconcile(at(2024, 4, 15, 0));
        assert_eq!(h.monto((2024, 4)), dec("0.0001"));
        h.payments[0].register_payment(at(2024, 4, 15, 1), None).unwrap();

        // Another 1.8 s brings the period to 0.0001 in total: nothing more owed.
        h.server.active_ms = 3_600;
        let out = h.reconcile(at(2024, 4, 16, 0));
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].added, dec("0"));
        assert_eq!(out.changes[0].payment.observaciones.as_deref(), Some(NOTA_AJUSTE_POST_PAGO));
        assert_eq!(h.monto((2024, 4)), dec("0.0001"));
    }

    #[test]
    fn as_of_before_open_interval_start_is_clamped() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 4, 1, 0));
        h.reconcile(at(2024, 4, 1, 1));

        // The caller's clock lags a few milliseconds behind the last start.
        let skewed = at(2024, 4, 1, 1) - Duration::milliseconds(5);
        let out = reconcile(&mut h.server, &h.intervals, &mut h.payments, skewed).unwrap();
        assert!(out.is_noop());
        assert_eq!(h.server.accrual_started_at, Some(at(2024, 4, 1, 1)));
        assert_eq!(h.server.billed_active_ms, 3_600_000);
    }

    #[test]
    fn stop_start_gaps_are_not_billed() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 6, 30, 20));
        h.go(ServerStatus::Stopped, at(2024, 6, 30, 22));
        h.go(ServerStatus::Running, at(2024, 7, 2, 0));
        h.go(ServerStatus::Terminated, at(2024, 7, 2, 3));

        h.reconcile(at(2024, 7, 3, 0));
        assert_eq!(h.monto((2024, 6)), dec("0.2"));
        assert_eq!(h.monto((2024, 7)), dec("0.3"));
    }

    #[test]
    fn partially_billed_prefix_is_skipped() {
        let mut h = Harness::new();
        h.go(ServerStatus::Running, at(2024, 8, 31, 22));
        h.go(ServerStatus::Stopped, at(2024, 9, 1, 2));
        // First hour already billed elsewhere.
        h.server.billed_active_ms = 3_600_000;

        let out = h.reconcile(at(2024, 9, 2, 0));
        assert_eq!(out.consumed_ms, 3 * 3_600_000);
        assert_eq!(h.monto((2024, 8)), dec("0.1"));
        assert_eq!(h.monto((2024, 9)), dec("0.2"));
    }

    #[test]
    fn inconsistent_server_is_rejected_untouched() {
        let mut h = Harness::new();
        h.server.estado = ServerStatus::Stopped;
        h.server.active_ms = 1000;
        h.server.billed_active_ms = 2000;
        let err = reconcile(&mut h.server, &[], &mut h.payments, at(2024, 1, 1, 0)).unwrap_err();
        assert!(matches!(err, BillingError::InconsistentAccrualState { .. }));
        assert_eq!(h.server.billed_active_ms, 2000);
        assert!(h.payments.is_empty());
    }

    #[test]
    fn billed_never_exceeds_active() {
        let mut h = Harness::new();
        let mut when = at(2024, 1, 1, 0);
        for day in 0..60 {
            let to = if day % 3 == 0 { ServerStatus::Stopped } else { ServerStatus::Running };
            h.go(to, when);
            when += Duration::hours(17);
            h.reconcile(when);
            assert!(h.server.billed_active_ms <= h.server.active_ms);
        }
    }

    #[test]
    fn overdue_only_after_due_date() {
        let mut p = PagoMensual::new_pendiente(Uuid::new_v4(), 2024, 4, dec("5"), None, at(2024, 4, 30, 0));
        assert!(!is_overdue(&p, at(2024, 5, 10, 23), 10));
        assert!(is_overdue(&p, at(2024, 5, 11, 0), 10));
        p.register_payment(at(2024, 5, 1, 0), None).unwrap();
        assert!(!is_overdue(&p, at(2024, 6, 1, 0), 10));
    }
}
