use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::models::{Session, Student};
use crate::db::repositories::{
    active_session, completed_minutes_on, insert_session, recompute_daily_stats,
    update_session_close,
};
use crate::error::{Error, Result};
use crate::DAILY_CAP_MINUTES;

/// Check-in transition: `NoActiveSession -> Active`. Rejected outright while a
/// session is open (never silently checks out first) and once the day's
/// completed minutes have reached the cap.
pub(crate) fn check_in(
    conn: &mut Connection,
    student: &Student,
    now: DateTime<Utc>,
) -> Result<Session> {
    let tx = conn.transaction()?;

    if active_session(&tx, student.id)?.is_some() {
        return Err(Error::AlreadyCheckedIn(student.student_no.clone()));
    }
    let completed = completed_minutes_on(&tx, student.id, now.date_naive())?;
    if completed >= DAILY_CAP_MINUTES {
        return Err(Error::DailyLimitReached(student.student_no.clone()));
    }

    let session = Session::new_open(student.id, now);
    insert_session(&tx, &session)?;
    tx.commit()?;
    Ok(session)
}

/// Check-out transition: `Active -> Closed`. Closes the open session,
/// derives its duration, and recomputes the day's aggregate in the same
/// transaction.
pub(crate) fn check_out(
    conn: &mut Connection,
    student: &Student,
    now: DateTime<Utc>,
) -> Result<Session> {
    let tx = conn.transaction()?;

    let mut session = active_session(&tx, student.id)?
        .ok_or_else(|| Error::NoActiveSession(student.student_no.clone()))?;
    session.close_at(now);
    update_session_close(&tx, &session)?;
    recompute_daily_stats(&tx, student.id, session.date)?;

    tx.commit()?;
    Ok(session)
}

/// Completed minutes remaining under the daily cap. The check uses completed
/// sessions only; an open session is bounded after the fact by the capper.
pub(crate) fn remaining_minutes(
    conn: &Connection,
    student_id: i64,
    date: NaiveDate,
) -> Result<u32> {
    let completed = completed_minutes_on(conn, student_id, date)?;
    Ok(DAILY_CAP_MINUTES.saturating_sub(completed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewStudent, PeCourse};
    use crate::db::repositories::insert_student;
    use crate::db::test_conn;
    use chrono::{Duration, TimeZone};
    use rusqlite::params;

    fn register(conn: &Connection) -> Student {
        let new = NewStudent {
            student_no: "2023-123456".into(),
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            pe_course: PeCourse::PeduOne,
            block_section: "STEM241".into(),
            rfid: None,
        };
        insert_student(conn, &new, Utc::now()).unwrap()
    }

    fn stats_minutes(conn: &Connection, student_id: i64, date: NaiveDate) -> u32 {
        conn.query_row(
            "SELECT total_minutes FROM gym_daily_stats WHERE student_id = ?1 AND date = ?2",
            params![student_id, date.format("%Y-%m-%d").to_string()],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v as u32)
        .unwrap_or(0)
    }

    #[test]
    fn check_in_then_out_closes_session_and_updates_aggregate() {
        let mut conn = test_conn();
        let student = register(&conn);
        let at = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        let session = check_in(&mut conn, &student, at).unwrap();
        assert!(session.is_active);

        let closed = check_out(&mut conn, &student, at + Duration::minutes(50)).unwrap();
        assert!(!closed.is_active);
        assert_eq!(closed.duration_minutes, 50);
        assert_eq!(stats_minutes(&conn, student.id, at.date_naive()), 50);
    }

    #[test]
    fn double_check_in_is_rejected() {
        let mut conn = test_conn();
        let student = register(&conn);
        let at = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        check_in(&mut conn, &student, at).unwrap();
        let err = check_in(&mut conn, &student, at + Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedIn(_)));
    }

    #[test]
    fn check_out_without_active_session_is_rejected() {
        let mut conn = test_conn();
        let student = register(&conn);
        let at = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        let err = check_out(&mut conn, &student, at).unwrap_err();
        assert!(matches!(err, Error::NoActiveSession(_)));
    }

    #[test]
    fn daily_cap_blocks_further_check_ins() {
        let mut conn = test_conn();
        let student = register(&conn);
        let at = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        check_in(&mut conn, &student, at).unwrap();
        check_out(&mut conn, &student, at + Duration::minutes(120)).unwrap();

        assert_eq!(
            remaining_minutes(&conn, student.id, at.date_naive()).unwrap(),
            0
        );
        let err = check_in(&mut conn, &student, at + Duration::minutes(130)).unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached(_)));
    }

    #[test]
    fn open_session_does_not_count_toward_cap() {
        let mut conn = test_conn();
        let student = register(&conn);
        let at = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        check_in(&mut conn, &student, at).unwrap();
        // Still the full cap available while the session is open.
        assert_eq!(
            remaining_minutes(&conn, student.id, at.date_naive()).unwrap(),
            120
        );
    }

    #[test]
    fn cap_resets_on_a_new_day() {
        let mut conn = test_conn();
        let student = register(&conn);
        let day_one = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();

        check_in(&mut conn, &student, day_one).unwrap();
        check_out(&mut conn, &student, day_one + Duration::minutes(120)).unwrap();

        let day_two = Utc.with_ymd_and_hms(2025, 8, 12, 9, 0, 0).unwrap();
        let session = check_in(&mut conn, &student, day_two).unwrap();
        assert!(session.is_active);
    }
}
