use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{
        date_to_string, parse_date, parse_datetime, parse_optional_datetime, to_minutes_i64,
        to_minutes_u32,
    },
    models::Session,
};
use crate::error::Result;

const SESSION_COLUMNS: &str =
    "id, student_id, check_in_at, check_out_at, duration_minutes, date, is_active";

fn row_to_session(row: &Row) -> Result<Session> {
    let check_in_at: String = row.get("check_in_at")?;
    let check_out_at: Option<String> = row.get("check_out_at")?;
    let duration_minutes: i64 = row.get("duration_minutes")?;
    let date: String = row.get("date")?;

    Ok(Session {
        id: row.get("id")?,
        student_id: row.get("student_id")?,
        check_in_at: parse_datetime(&check_in_at, "check_in_at")?,
        check_out_at: parse_optional_datetime(check_out_at, "check_out_at")?,
        duration_minutes: to_minutes_u32(duration_minutes, "duration_minutes")?,
        date: parse_date(&date, "date")?,
        is_active: row.get("is_active")?,
    })
}

pub(crate) fn insert_session(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO gym_sessions (id, student_id, check_in_at, check_out_at, duration_minutes, date, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session.id,
            session.student_id,
            session.check_in_at.to_rfc3339(),
            session.check_out_at.as_ref().map(|dt| dt.to_rfc3339()),
            to_minutes_i64(session.duration_minutes),
            date_to_string(session.date),
            session.is_active,
        ],
    )?;
    Ok(())
}

/// Persists the closing fields of a session (checkout, duration, active flag).
pub(crate) fn update_session_close(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "UPDATE gym_sessions
         SET check_out_at = ?1,
             duration_minutes = ?2,
             is_active = ?3
         WHERE id = ?4",
        params![
            session.check_out_at.as_ref().map(|dt| dt.to_rfc3339()),
            to_minutes_i64(session.duration_minutes),
            session.is_active,
            session.id,
        ],
    )?;
    Ok(())
}

pub(crate) fn active_session(conn: &Connection, student_id: i64) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM gym_sessions
         WHERE student_id = ?1 AND is_active = 1
         ORDER BY check_in_at DESC
         LIMIT 1"
    ))?;
    let mut rows = stmt.query(params![student_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_session(row)?)),
        None => Ok(None),
    }
}

/// Minutes of completed sessions for a (student, date). Open sessions do not
/// count toward the daily cap; they are bounded after the fact by the capper.
pub(crate) fn completed_minutes_on(
    conn: &Connection,
    student_id: i64,
    date: NaiveDate,
) -> Result<u32> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(duration_minutes), 0) FROM gym_sessions
         WHERE student_id = ?1 AND date = ?2 AND check_out_at IS NOT NULL",
        params![student_id, date_to_string(date)],
        |row| row.get(0),
    )?;
    to_minutes_u32(total, "total_minutes")
}

/// Sessions still marked open whose date is strictly before `today`.
pub(crate) fn open_sessions_before(conn: &Connection, today: NaiveDate) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM gym_sessions
         WHERE is_active = 1 AND check_out_at IS NULL AND date < ?1
         ORDER BY check_in_at"
    ))?;
    let mut rows = stmt.query(params![date_to_string(today)])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    Ok(sessions)
}

/// All sessions dated before `today`, oldest check-in first. Optionally
/// limited to sessions on or after `since`.
pub(crate) fn sessions_before(
    conn: &Connection,
    today: NaiveDate,
    since: Option<NaiveDate>,
) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM gym_sessions
         WHERE date < ?1 AND date >= ?2
         ORDER BY check_in_at"
    ))?;
    let floor = since.map(date_to_string).unwrap_or_else(|| "0000-00-00".to_string());
    let mut rows = stmt.query(params![date_to_string(today), floor])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    Ok(sessions)
}

pub(crate) fn completed_sessions_for_student(
    conn: &Connection,
    student_id: i64,
) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM gym_sessions
         WHERE student_id = ?1 AND check_out_at IS NOT NULL
         ORDER BY date, check_in_at"
    ))?;
    let mut rows = stmt.query(params![student_id])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    Ok(sessions)
}

/// Dedup guard for imported records: a session is the same record if it
/// shares student, date, and check-in instant.
pub(crate) fn session_exists(
    conn: &Connection,
    student_id: i64,
    date: NaiveDate,
    check_in_at: DateTime<Utc>,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM gym_sessions
         WHERE student_id = ?1 AND date = ?2 AND check_in_at = ?3",
        params![student_id, date_to_string(date), check_in_at.to_rfc3339()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn distinct_session_dates(conn: &Connection, student_id: i64) -> Result<Vec<NaiveDate>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT date FROM gym_sessions WHERE student_id = ?1 ORDER BY date",
    )?;
    let mut rows = stmt.query(params![student_id])?;
    let mut dates = Vec::new();
    while let Some(row) = rows.next()? {
        let raw: String = row.get(0)?;
        dates.push(parse_date(&raw, "date")?);
    }
    Ok(dates)
}

pub(crate) fn repoint_sessions(conn: &Connection, from_student: i64, to_student: i64) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE gym_sessions SET student_id = ?1 WHERE student_id = ?2",
        params![to_student, from_student],
    )?;
    Ok(moved)
}

impl Database {
    pub async fn get_active_session(&self, student_no: &str) -> Result<Option<Session>> {
        let student_no = student_no.to_string();
        self.execute(move |conn| {
            let student = super::students::find_student_by_no(conn, &student_no)?
                .ok_or_else(|| crate::error::Error::StudentNotFound(student_no.clone()))?;
            active_session(conn, student.id)
        })
        .await
    }
}
