//! Active time accounting.
//!
//! Converts raw activity timestamps into accumulated focused/non-idle
//! duration. [`update_active_time`] is the single accrual path: every
//! mutation that touches activity (keystroke, run, submit, heartbeat tick,
//! focus change, session end) must run it before reading or reporting
//! `active_ms`, so totals are never stale.

use chrono::{DateTime, Utc};

use crate::session::Session;

/// Accrues active time on a session up to `now`.
///
/// No-op unless the session is active and focused. Gaps no larger than
/// `idle_threshold_ms` since the last activity count as continuous
/// engagement and are added to `active_ms`; larger gaps are idle and dropped
/// without error. Negative gaps (clock skew) accrue nothing. `last_activity`
/// always advances to `now`, never backwards.
pub fn update_active_time(session: &mut Session, idle_threshold_ms: i64, now: DateTime<Utc>) {
    if !session.is_active || !session.focused {
        return;
    }
    let elapsed_ms = (now - session.last_activity).num_milliseconds();
    if (0..=idle_threshold_ms).contains(&elapsed_ms) {
        session.active_ms += elapsed_ms;
    }
    if now > session.last_activity {
        session.last_activity = now;
    }
}
