//! Overdue fine policy.
//!
//! A return at or before the due date costs nothing. Past it, every started day
//! counts as a full day: `fine = ceil(overdue / 1 day) * rate`.

use chrono::{DateTime, Utc};

/// Fine charged per started overdue day, in cents.
pub const FINE_PER_DAY_CENTS: i64 = 10;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Number of started days between `due` and `now`; 0 when not overdue.
pub fn days_overdue(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if now <= due {
        return 0;
    }
    let late_ms = (now - due).num_milliseconds();
    (late_ms + MS_PER_DAY - 1) / MS_PER_DAY
}

pub fn calculate_fine(due: DateTime<Utc>, now: DateTime<Utc>, per_day_cents: i64) -> i64 {
    days_overdue(due, now).saturating_mul(per_day_cents)
}
