//! Active-time accrual over the server lifecycle.
//!
//! `active_ms` grows only while a server is `running`. Entering `running`
//! opens an interval at `accrual_started_at`; leaving it closes the interval
//! and folds its duration into `active_ms`. Closed intervals are returned to
//! the caller so they can be persisted for month attribution.

use chrono::{DateTime, Utc};

use crate::error::BillingError;
use crate::{ActiveInterval, Server, ServerStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: ServerStatus,
    pub to: ServerStatus,
    /// Interval closed by this transition (only when leaving `running`).
    pub closed_interval: Option<ActiveInterval>,
    /// Milliseconds added to `active_ms` by this transition.
    pub accrued_ms: i64,
}

impl TransitionOutcome {
    pub fn started_accrual(&self) -> bool {
        self.from != ServerStatus::Running && self.to == ServerStatus::Running
    }

    pub fn stopped_accrual(&self) -> bool {
        self.closed_interval.is_some()
    }
}

/// Check the invariants the accrual math relies on.
pub fn check_consistency(server: &Server) -> Result<(), BillingError> {
    if server.active_ms < 0 || server.billed_active_ms < 0 {
        return Err(BillingError::inconsistent(server.id, "negative accrual counters"));
    }
    if server.billed_active_ms > server.active_ms {
        return Err(BillingError::inconsistent(
            server.id,
            format!(
                "billed_active_ms ({}) exceeds active_ms ({})",
                server.billed_active_ms, server.active_ms
            ),
        ));
    }
    match (server.estado, server.accrual_started_at) {
        (ServerStatus::Running, None) => Err(BillingError::inconsistent(
            server.id,
            "server is running without an accrual start",
        )),
        (estado, Some(_)) if estado != ServerStatus::Running => Err(BillingError::inconsistent(
            server.id,
            format!("server is {} but has an open accrual interval", estado),
        )),
        _ => Ok(()),
    }
}

/// Active time as of `now`, including the open interval when running.
pub fn effective_active_ms(server: &Server, now: DateTime<Utc>) -> Result<i64, BillingError> {
    check_consistency(server)?;
    match server.accrual_started_at {
        Some(start) if server.estado == ServerStatus::Running => {
            let elapsed = (now - start).num_milliseconds().max(0);
            Ok(server.active_ms + elapsed)
        }
        _ => Ok(server.active_ms),
    }
}

/// Apply a status change at `at`, updating the accrual fields in place.
///
/// Same-status transitions are no-ops. Nothing leaves `terminated`. On error
/// the server is left untouched.
pub fn transition(
    server: &mut Server,
    to: ServerStatus,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, BillingError> {
    let from = server.estado;

    if from == ServerStatus::Terminated && to != ServerStatus::Terminated {
        return Err(BillingError::InvalidTransition { from, to });
    }
    check_consistency(server)?;

    let mut outcome = TransitionOutcome {
        from,
        to,
        closed_interval: None,
        accrued_ms: 0,
    };
    if from == to {
        return Ok(outcome);
    }

    if from == ServerStatus::Running {
        // check_consistency guarantees the start is present
        let Some(start) = server.accrual_started_at else {
            return Err(BillingError::inconsistent(server.id, "missing accrual start"));
        };
        if at < start {
            return Err(BillingError::inconsistent(
                server.id,
                format!("transition at {} precedes accrual start {}", at, start),
            ));
        }
        let elapsed = (at - start).num_milliseconds();
        server.active_ms += elapsed;
        server.active_seconds = server.active_ms / 1000;
        server.latest_release = Some(at);
        server.accrual_started_at = None;
        outcome.accrued_ms = elapsed;
        outcome.closed_interval = Some(ActiveInterval {
            server_id: server.id,
            started_at: start,
            ended_at: at,
        });
    }

    if to == ServerStatus::Running {
        if server.first_activated_at.is_none() {
            server.first_activated_at = Some(at);
        }
        server.accrual_started_at = Some(at);
    }

    server.estado = to;
    Ok(outcome)
}

/// Fold the open interval of a running server into `active_ms` up to `at`
/// and restart it there. Effective active time is unchanged; the stored
/// counters catch up so billed time never exceeds `active_ms`.
pub fn checkpoint(
    server: &mut Server,
    at: DateTime<Utc>,
) -> Result<Option<ActiveInterval>, BillingError> {
    check_consistency(server)?;
    let Some(start) = server.accrual_started_at else {
        return Ok(None);
    };
    if at < start {
        return Err(BillingError::inconsistent(
            server.id,
            format!("checkpoint at {} precedes accrual start {}", at, start),
        ));
    }
    if at == start {
        return Ok(None);
    }
    server.active_ms += (at - start).num_milliseconds();
    server.active_seconds = server.active_ms / 1000;
    server.accrual_started_at = Some(at);
    Ok(Some(ActiveInterval {
        server_id: server.id,
        started_at: start,
        ended_at: at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use crate::{Connectivity, DiskType};

    fn server(estado: ServerStatus) -> Server {
        Server {
            id: Uuid::new_v4(),
            nombre: "web-01".to_string(),
            cliente_id: None,
            region_id: Uuid::new_v4(),
            sistema_operativo_id: Uuid::new_v4(),
            imagen_id: Uuid::new_v4(),
            instance_type_id: Uuid::new_v4(),
            ram_gb: 4,
            disco_gb: 20,
            disco_tipo: DiskType::Ssd,
            conexion: Connectivity::Publica,
            clave_privada: None,
            estado,
            costo_diario: BigDecimal::from(1),
            first_activated_at: None,
            latest_release: None,
            accrual_started_at: None,
            active_seconds: 0,
            active_ms: 0,
            billed_active_ms: 0,
            created_at: t0(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn first_activation_is_set_once() {
        let mut s = server(ServerStatus::Pending);
        let out = transition(&mut s, ServerStatus::Running, t0()).unwrap();
        assert!(out.started_accrual());
        assert_eq!(s.first_activated_at, Some(t0()));
        assert_eq!(s.accrual_started_at, Some(t0()));

        transition(&mut s, ServerStatus::Stopped, t0() + Duration::hours(1)).unwrap();
        transition(&mut s, ServerStatus::Running, t0() + Duration::hours(2)).unwrap();
        assert_eq!(s.first_activated_at, Some(t0()));
        assert_eq!(s.accrual_started_at, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn leaving_running_accrues_and_records_release() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        let stop = t0() + Duration::minutes(90);
        let out = transition(&mut s, ServerStatus::Stopped, stop).unwrap();

        assert_eq!(out.accrued_ms, 90 * 60 * 1000);
        assert_eq!(s.active_ms, 90 * 60 * 1000);
        assert_eq!(s.active_seconds, 90 * 60);
        assert_eq!(s.latest_release, Some(stop));
        assert_eq!(s.accrual_started_at, None);
        assert_eq!(
            out.closed_interval,
            Some(ActiveInterval {
                server_id: s.id,
                started_at: t0(),
                ended_at: stop
            })
        );
    }

    #[test]
    fn effective_active_ms_includes_open_interval() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        transition(&mut s, ServerStatus::Stopped, t0() + Duration::minutes(10)).unwrap();
        transition(&mut s, ServerStatus::Running, t0() + Duration::minutes(30)).unwrap();

        let now = t0() + Duration::minutes(35);
        assert_eq!(effective_active_ms(&s, now).unwrap(), 15 * 60 * 1000);

        transition(&mut s, ServerStatus::Stopped, now).unwrap();
        // Frozen while stopped.
        assert_eq!(
            effective_active_ms(&s, now + Duration::days(3)).unwrap(),
            15 * 60 * 1000
        );
    }

    #[test]
    fn active_ms_is_sum_of_intervals_and_monotonic() {
        let mut s = server(ServerStatus::PendienteAprobacion);
        let steps = [
            (ServerStatus::Running, 0),
            (ServerStatus::Stopped, 7),
            (ServerStatus::Running, 20),
            (ServerStatus::PendienteAprobacion, 21),
            (ServerStatus::Running, 40),
            (ServerStatus::Terminated, 55),
        ];
        let mut closed = Vec::new();
        let mut last = 0;
        for (to, minute) in steps {
            let at = t0() + Duration::minutes(minute);
            let out = transition(&mut s, to, at).unwrap();
            closed.extend(out.closed_interval);
            let eff = effective_active_ms(&s, at).unwrap();
            assert!(eff >= last);
            last = eff;
        }
        let sum: i64 = closed.iter().map(ActiveInterval::duration_ms).sum();
        assert_eq!(sum, (7 + 1 + 15) * 60 * 1000);
        assert_eq!(s.active_ms, sum);
    }

    #[test]
    fn terminated_cannot_run_again() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        transition(&mut s, ServerStatus::Terminated, t0() + Duration::hours(1)).unwrap();
        s.billed_active_ms = 1000;
        let before = s.clone();

        let err = transition(&mut s, ServerStatus::Running, t0() + Duration::hours(2)).unwrap_err();
        assert_eq!(
            err,
            BillingError::InvalidTransition {
                from: ServerStatus::Terminated,
                to: ServerStatus::Running
            }
        );
        assert_eq!(s.active_ms, before.active_ms);
        assert_eq!(s.billed_active_ms, before.billed_active_ms);
        assert_eq!(s.estado, ServerStatus::Terminated);

        assert!(transition(&mut s, ServerStatus::Stopped, t0() + Duration::hours(2)).is_err());
        assert!(transition(&mut s, ServerStatus::Terminated, t0() + Duration::hours(2)).is_ok());
    }

    #[test]
    fn running_to_running_keeps_accrual_start() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        let out = transition(&mut s, ServerStatus::Running, t0() + Duration::hours(1)).unwrap();
        assert_eq!(out.accrued_ms, 0);
        assert_eq!(s.accrual_started_at, Some(t0()));
    }

    #[test]
    fn running_without_start_is_inconsistent() {
        let mut s = server(ServerStatus::Running);
        let err = transition(&mut s, ServerStatus::Stopped, t0()).unwrap_err();
        assert_eq!(err.code(), "inconsistent_accrual_state");
        assert!(effective_active_ms(&s, t0()).is_err());
    }

    #[test]
    fn billed_over_active_is_inconsistent() {
        let mut s = server(ServerStatus::Stopped);
        s.active_ms = 10;
        s.billed_active_ms = 11;
        assert!(matches!(
            check_consistency(&s),
            Err(BillingError::InconsistentAccrualState { .. })
        ));
    }

    #[test]
    fn checkpoint_preserves_effective_time() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        let mid = t0() + Duration::minutes(45);
        let later = t0() + Duration::minutes(60);
        let before = effective_active_ms(&s, later).unwrap();

        let iv = checkpoint(&mut s, mid).unwrap().unwrap();
        assert_eq!(iv.duration_ms(), 45 * 60 * 1000);
        assert_eq!(s.active_ms, 45 * 60 * 1000);
        assert_eq!(s.accrual_started_at, Some(mid));
        assert_eq!(s.estado, ServerStatus::Running);
        assert_eq!(effective_active_ms(&s, later).unwrap(), before);

        assert_eq!(checkpoint(&mut s, mid).unwrap(), None);

        let mut stopped = server(ServerStatus::Stopped);
        assert_eq!(checkpoint(&mut stopped, later).unwrap(), None);
    }

    #[test]
    fn clock_going_backwards_is_rejected() {
        let mut s = server(ServerStatus::Pending);
        transition(&mut s, ServerStatus::Running, t0()).unwrap();
        let before = s.clone();
        assert!(transition(&mut s, ServerStatus::Stopped, t0() - Duration::seconds(1)).is_err());
        assert_eq!(s.estado, before.estado);
        assert_eq!(s.active_ms, before.active_ms);
    }
}
