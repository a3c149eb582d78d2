use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    helpers::{date_to_string, parse_date, to_minutes_u32},
    models::DailyStats,
};
use crate::error::{Error, Result};

/// Recomputes the (student, date) aggregate strictly from completed sessions
/// and overwrites the cached row. This is the only way aggregates change;
/// incremental adjustments drift from ground truth under retroactive edits.
pub(crate) fn recompute_daily_stats(
    conn: &Connection,
    student_id: i64,
    date: NaiveDate,
) -> Result<DailyStats> {
    let (total_sessions, total_minutes): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(duration_minutes), 0) FROM gym_sessions
         WHERE student_id = ?1 AND date = ?2 AND check_out_at IS NOT NULL",
        params![student_id, date_to_string(date)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    conn.execute(
        "INSERT INTO gym_daily_stats (student_id, date, total_sessions, total_minutes)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (student_id, date) DO UPDATE SET
             total_sessions = excluded.total_sessions,
             total_minutes = excluded.total_minutes",
        params![student_id, date_to_string(date), total_sessions, total_minutes],
    )?;

    Ok(DailyStats {
        student_id,
        date,
        total_sessions: to_minutes_u32(total_sessions, "total_sessions")?,
        total_minutes: to_minutes_u32(total_minutes, "total_minutes")?,
    })
}

/// Aggregate rows for a student within `[from, to]`, ordered by date.
pub(crate) fn stats_in_range(
    conn: &Connection,
    student_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailyStats>> {
    let mut stmt = conn.prepare(
        "SELECT date, total_sessions, total_minutes FROM gym_daily_stats
         WHERE student_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date",
    )?;
    let mut rows = stmt.query(params![
        student_id,
        date_to_string(from),
        date_to_string(to)
    ])?;
    let mut stats = Vec::new();
    while let Some(row) = rows.next()? {
        let date: String = row.get(0)?;
        let total_sessions: i64 = row.get(1)?;
        let total_minutes: i64 = row.get(2)?;
        stats.push(DailyStats {
            student_id,
            date: parse_date(&date, "date")?,
            total_sessions: to_minutes_u32(total_sessions, "total_sessions")?,
            total_minutes: to_minutes_u32(total_minutes, "total_minutes")?,
        });
    }
    Ok(stats)
}

impl Database {
    /// Recomputes one student's aggregate row for `date` from scratch.
    pub async fn recompute_daily_stats(
        &self,
        student_no: &str,
        date: NaiveDate,
    ) -> Result<DailyStats> {
        let student_no = student_no.to_string();
        self.execute(move |conn| {
            let student = super::students::find_student_by_no(conn, &student_no)?
                .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;
            recompute_daily_stats(conn, student.id, date)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::{insert_session, update_session_close};
    use crate::db::test_conn;
    use chrono::{Duration, TimeZone, Utc};

    fn insert_test_student(conn: &Connection) -> i64 {
        conn.execute(
            "INSERT INTO gym_students (student_no, first_name, last_name, pe_course, block_section, registered_at)
             VALUES ('2023-123456', 'Ana', 'Reyes', 'N/A', 'STEM241', ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn aggregate_is_overwritten_from_completed_sessions() {
        let conn = test_conn();
        let student_id = insert_test_student(&conn);
        let check_in = Utc.with_ymd_and_hms(2025, 8, 11, 9, 0, 0).unwrap();
        let date = check_in.date_naive();

        // Open session contributes nothing.
        let open = Session::new_open(student_id, check_in);
        insert_session(&conn, &open).unwrap();
        let stats = recompute_daily_stats(&conn, student_id, date).unwrap();
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.total_minutes, 0);

        // Closing it makes the aggregate match the session sum exactly.
        let mut closed = open;
        closed.close_at(check_in + Duration::minutes(45));
        update_session_close(&conn, &closed).unwrap();
        let stats = recompute_daily_stats(&conn, student_id, date).unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.total_minutes, 45);

        // Recompute is idempotent and overwrites, never increments.
        let stats = recompute_daily_stats(&conn, student_id, date).unwrap();
        assert_eq!(stats.total_minutes, 45);
    }

    #[test]
    fn range_query_returns_rows_in_date_order() {
        let conn = test_conn();
        let student_id = insert_test_student(&conn);
        for day in [11, 13, 12] {
            let check_in = Utc.with_ymd_and_hms(2025, 8, day, 9, 0, 0).unwrap();
            let mut session = Session::new_open(student_id, check_in);
            session.close_at(check_in + Duration::minutes(30));
            insert_session(&conn, &session).unwrap();
            recompute_daily_stats(&conn, student_id, session.date).unwrap();
        }

        let from = chrono::NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let to = chrono::NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let stats = stats_in_range(&conn, student_id, from, to).unwrap();
        assert_eq!(stats.len(), 3);
        assert!(stats.windows(2).all(|w| w[0].date < w[1].date));
    }
}
