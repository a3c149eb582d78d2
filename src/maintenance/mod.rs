//! Scheduled reconciliation over the session store: closes sessions left
//! open on previous days and truncates anything that ran past the daily cap,
//! keeping the per-day aggregates consistent as it goes.
//!
//! Each session is its own transactional unit. A unit that fails rolls back
//! alone; the run logs the failure and continues with the rest.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{info, warn};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::helpers::{end_of_day, parse_datetime};
use crate::db::repositories::{
    open_sessions_before, recompute_daily_stats, sessions_before, update_session_close,
};
use crate::db::Database;
use crate::error::Result;
use crate::DAILY_CAP_MINUTES;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub sessions_closed: u32,
    pub sessions_capped: u32,
    pub days_updated: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapReport {
    pub sessions_examined: u32,
    pub sessions_capped: u32,
    pub sessions_repaired: u32,
}

fn cap_duration() -> Duration {
    Duration::minutes(i64::from(DAILY_CAP_MINUTES))
}

/// Closes sessions still open from days before `today` at
/// `min(check_in + cap, end of that day)`. Idempotent: closed sessions no
/// longer match the selection, so a second run changes nothing.
pub(crate) fn close_stale_sessions(
    conn: &mut Connection,
    today: NaiveDate,
) -> Result<(u32, HashSet<(i64, NaiveDate)>)> {
    let stale = open_sessions_before(conn, today)?;
    let mut closed = 0u32;
    let mut touched = HashSet::new();

    for mut session in stale {
        let by_duration = session.check_in_at + cap_duration();
        let by_day = end_of_day(session.date);
        let new_checkout = by_duration.min(by_day);

        let unit = (|| -> Result<()> {
            let tx = conn.transaction()?;
            // close_at clamps a checkout behind the check-in to zero minutes.
            session.close_at(new_checkout);
            update_session_close(&tx, &session)?;
            recompute_daily_stats(&tx, session.student_id, session.date)?;
            tx.commit()?;
            Ok(())
        })();

        match unit {
            Ok(()) => {
                closed += 1;
                touched.insert((session.student_id, session.date));
            }
            Err(err) => {
                warn!("Failed to close stale session {}: {err}", session.id);
            }
        }
    }

    Ok((closed, touched))
}

/// Truncates sessions on days before `today` whose effective checkout
/// (recorded, else end of that day) exceeds the cap, to exactly
/// `check_in + cap`.
pub(crate) fn cap_sessions_before(
    conn: &mut Connection,
    today: NaiveDate,
) -> Result<(u32, HashSet<(i64, NaiveDate)>)> {
    let candidates = sessions_before(conn, today, None)?;
    let mut capped = 0u32;
    let mut touched = HashSet::new();

    for mut session in candidates {
        let actual_checkout = session.check_out_at.unwrap_or_else(|| end_of_day(session.date));
        if actual_checkout - session.check_in_at <= cap_duration() {
            continue;
        }

        let unit = (|| -> Result<()> {
            let tx = conn.transaction()?;
            session.close_at(session.check_in_at + cap_duration());
            update_session_close(&tx, &session)?;
            recompute_daily_stats(&tx, session.student_id, session.date)?;
            tx.commit()?;
            Ok(())
        })();

        match unit {
            Ok(()) => {
                capped += 1;
                touched.insert((session.student_id, session.date));
            }
            Err(err) => {
                warn!("Failed to cap session {}: {err}", session.id);
            }
        }
    }

    Ok((capped, touched))
}

/// Full cleanup pass over all sessions (optionally from `since`): treats a
/// missing checkout as `now`, caps overlong sessions, and repairs completed
/// rows whose stored duration drifted from the timestamps.
pub(crate) fn cap_all_sessions(
    conn: &mut Connection,
    now: DateTime<Utc>,
    since: Option<NaiveDate>,
) -> Result<CapReport> {
    // Include today: the upper bound is tomorrow's date.
    let upper = now.date_naive() + Duration::days(1);
    let candidates = sessions_before(conn, upper, since)?;
    let mut report = CapReport::default();

    for mut session in candidates {
        report.sessions_examined += 1;
        let actual_checkout = session.check_out_at.unwrap_or(now);
        let duration = actual_checkout - session.check_in_at;

        let (new_checkout, repaired) = if duration > cap_duration() {
            (session.check_in_at + cap_duration(), false)
        } else if session.check_out_at.is_some()
            && i64::from(session.duration_minutes) != duration.num_minutes().max(0)
        {
            // Completed within the cap but with a drifted stored duration.
            (actual_checkout, true)
        } else {
            continue;
        };

        let unit = (|| -> Result<()> {
            let tx = conn.transaction()?;
            session.close_at(new_checkout);
            update_session_close(&tx, &session)?;
            recompute_daily_stats(&tx, session.student_id, session.date)?;
            tx.commit()?;
            Ok(())
        })();

        match unit {
            Ok(()) if repaired => report.sessions_repaired += 1,
            Ok(()) => report.sessions_capped += 1,
            Err(err) => warn!("Failed to cap session {}: {err}", session.id),
        }
    }

    Ok(report)
}

pub(crate) fn run_maintenance(conn: &mut Connection, now: DateTime<Utc>) -> Result<MaintenanceReport> {
    let today = now.date_naive();

    let (sessions_closed, closed_days) = close_stale_sessions(conn, today)?;
    let (sessions_capped, capped_days) = cap_sessions_before(conn, today)?;

    let days_updated = closed_days.union(&capped_days).count() as u32;
    let report = MaintenanceReport {
        sessions_closed,
        sessions_capped,
        days_updated,
    };

    // Bookkeeping only: the passes above already committed, so a failure
    // here must not turn a successful run into an error.
    let logged = conn.execute(
        "INSERT INTO maintenance_runs (ran_at, sessions_closed, sessions_capped, days_updated)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            now.to_rfc3339(),
            report.sessions_closed,
            report.sessions_capped,
            report.days_updated,
        ],
    );
    if let Err(err) = logged {
        warn!("Failed to record maintenance run: {err}");
    }

    Ok(report)
}

pub(crate) fn last_run(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let mut stmt =
        conn.prepare("SELECT ran_at FROM maintenance_runs ORDER BY id DESC LIMIT 1")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let raw: String = row.get(0)?;
            Ok(Some(parse_datetime(&raw, "ran_at")?))
        }
        None => Ok(None),
    }
}

impl Database {
    /// Runs the stale-session closer and the previous-day capper, records the
    /// run, and returns the counts.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let report = self
            .execute(move |conn| run_maintenance(conn, Utc::now()))
            .await?;
        info!(
            "Maintenance run: {} stale sessions closed, {} capped, {} days updated",
            report.sessions_closed, report.sessions_capped, report.days_updated
        );
        Ok(report)
    }

    /// One-off cleanup over the whole table (or from `since`), including
    /// today's sessions.
    pub async fn cap_all_sessions(&self, since: Option<NaiveDate>) -> Result<CapReport> {
        self.execute(move |conn| cap_all_sessions(conn, Utc::now(), since))
            .await
    }

    pub async fn last_maintenance_run(&self) -> Result<Option<DateTime<Utc>>> {
        self.execute(|conn| last_run(conn)).await
    }
}
