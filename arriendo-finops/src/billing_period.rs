//! Calendar arithmetic for monthly invoices (UTC).

use arriendo_common::pricing::{round_half_up, ESCALA_MONETARIA};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

pub const MS_PER_DAY: i64 = 86_400_000;

/// (anio, mes) of an instant.
pub type Period = (i32, i32);

pub fn period_of(t: DateTime<Utc>) -> Period {
    (t.year(), t.month() as i32)
}

pub fn next_period((anio, mes): Period) -> Period {
    if mes >= 12 {
        (anio + 1, 1)
    } else {
        (anio, mes + 1)
    }
}

pub fn period_start((anio, mes): Period) -> Option<DateTime<Utc>> {
    let mes = u32::try_from(mes).ok()?;
    Utc.with_ymd_and_hms(anio, mes, 1, 0, 0, 0).single()
}

/// Invoices fall due `grace_days` after the end of their month.
pub fn due_date(period: Period, grace_days: i64) -> Option<DateTime<Utc>> {
    period_start(period)?;
    period_start(next_period(period)).map(|end| end + Duration::days(grace_days))
}

/// Split `[start, end)` at month boundaries.
///
/// The returned durations always add up to `(end - start)` in milliseconds.
pub fn split_by_month(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(Period, i64)> {
    let total = (end - start).num_milliseconds();
    if total <= 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut cursor = start;
    let mut assigned = 0;
    loop {
        let period = period_of(cursor);
        let boundary = period_start(next_period(period));
        match boundary {
            Some(b) if b < end => {
                let ms = (b - cursor).num_milliseconds();
                out.push((period, ms));
                assigned += ms;
                cursor = b;
            }
            _ => {
                out.push((period, total - assigned));
                break;
            }
        }
    }
    out
}

/// Amount owed for `ms` of active time at `costo_diario` per day.
pub fn amount_for_ms(ms: i64, costo_diario: &BigDecimal) -> BigDecimal {
    let exact = BigDecimal::from(ms) * costo_diario / BigDecimal::from(MS_PER_DAY);
    round_half_up(&exact, ESCALA_MONETARIA)
}
