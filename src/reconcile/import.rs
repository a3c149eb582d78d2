use chrono::{Duration, NaiveDate, NaiveTime};
use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::helpers::date_to_string;
use crate::db::models::{
    is_valid_student_no, normalize_block_section, NewStudent, PeCourse, Session, Student,
};
use crate::db::repositories::{
    find_student_by_no, insert_session, insert_student, recompute_daily_stats, session_exists,
    update_student_profile,
};
use crate::db::Database;
use crate::error::{Error, Result};

/// One row of the old per-day JSON attendance logs.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyEntry {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub enrolled_block: String,
    #[serde(default)]
    pub pe_course: String,
    #[serde(default)]
    pub workout_start: String,
    #[serde(default)]
    pub workout_end: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub sessions_created: u32,
    pub students_created: u32,
    pub entries_skipped: u32,
    pub unmapped_courses: u32,
}

/// Salvages a student number from a messy legacy value. Keeps it when already
/// well-formed (after dropping stray characters); otherwise looks for a
/// `20YY` year followed later by six consecutive digits. Anything else is a
/// validation error; the old importer fabricated a placeholder ID here,
/// which made duplicates worse.
pub(crate) fn clean_student_no(raw: &str) -> Result<String> {
    let stripped: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    if is_valid_student_no(&stripped) {
        return Ok(stripped);
    }

    let bytes = raw.as_bytes();
    let year_at = (0..bytes.len().saturating_sub(3)).find(|&i| {
        bytes[i] == b'2'
            && bytes[i + 1] == b'0'
            && bytes[i + 2].is_ascii_digit()
            && bytes[i + 3].is_ascii_digit()
    });
    if let Some(start) = year_at {
        let year = &raw[start..start + 4];
        let rest = &bytes[start + 4..];
        let mut run_start = None;
        let mut run_len = 0;
        for (i, b) in rest.iter().enumerate() {
            if b.is_ascii_digit() {
                if run_start.is_none() {
                    run_start = Some(i);
                    run_len = 0;
                }
                run_len += 1;
                if run_len == 6 {
                    let s = run_start.unwrap_or(i);
                    let digits = std::str::from_utf8(&rest[s..s + 6])
                        .map_err(|_| Error::InvalidStudentNo(raw.to_string()))?;
                    return Ok(format!("{year}-{digits}"));
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
    }

    Err(Error::InvalidStudentNo(raw.to_string()))
}

/// Strips middle initials ("V.", "b."), collapses whitespace, and
/// title-cases each word.
pub(crate) fn clean_name(name: &str) -> String {
    name.split_whitespace()
        .filter(|token| {
            !(token.len() == 2
                && token.ends_with('.')
                && token.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
        })
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The last whitespace token is the last name; everything before it is the
/// first name.
pub(crate) fn split_full_name(full_name: &str) -> Result<(String, String)> {
    let cleaned = clean_name(full_name);
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(Error::InvalidRecord(format!(
            "name '{full_name}' has no last name"
        )));
    }
    let last = tokens[tokens.len() - 1].to_string();
    let first = tokens[..tokens.len() - 1].join(" ");
    Ok((first, last))
}

fn parse_workout_time(raw: &str, field: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .map_err(|_| Error::InvalidRecord(format!("{field} '{raw}' is not HH:MM:SS")))
}

fn get_or_create_student(
    conn: &Connection,
    entry: &LegacyEntry,
    summary: &mut ImportSummary,
) -> Result<Student> {
    let (first_name, last_name) = split_full_name(&entry.full_name)?;
    let student_no = clean_student_no(&entry.student_id)?;
    let block_section = normalize_block_section(&entry.enrolled_block);
    let pe_course = match PeCourse::parse(&entry.pe_course) {
        Ok(course) => course,
        Err(Error::UnknownPeCourse(code)) => {
            // Flagged sentinel rather than silent coercion.
            warn!("Unmapped PE course '{code}' for {student_no}; recording as not enrolled");
            summary.unmapped_courses += 1;
            PeCourse::NotEnrolled
        }
        Err(err) => return Err(err),
    };

    if let Some(existing) = find_student_by_no(conn, &student_no)? {
        // Refresh only fields the log actually knows better.
        let pe = if pe_course != PeCourse::NotEnrolled {
            pe_course
        } else {
            existing.pe_course
        };
        let block = if block_section != "N/A" {
            block_section
        } else {
            existing.block_section.clone()
        };
        if pe != existing.pe_course || block != existing.block_section {
            update_student_profile(conn, existing.id, pe, &block, existing.rfid.as_deref())?;
        }
        return Ok(Student {
            pe_course: pe,
            block_section: block,
            ..existing
        });
    }

    let new = NewStudent {
        student_no,
        first_name,
        last_name,
        pe_course,
        block_section,
        rfid: None,
    }
    .validated()?;
    let created = insert_student(conn, &new, chrono::Utc::now())?;
    summary.students_created += 1;
    Ok(created)
}

/// Imports one day-log worth of entries inside a single transaction.
/// Malformed entries are logged and skipped; duplicates (same student, date,
/// and check-in) are skipped silently.
pub(crate) fn import_day(
    conn: &mut Connection,
    entries: &[LegacyEntry],
    date: NaiveDate,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let tx = conn.transaction()?;

    for entry in entries {
        let outcome = (|| -> Result<bool> {
            let student = get_or_create_student(&tx, entry, &mut summary)?;

            let start = parse_workout_time(&entry.workout_start, "workout_start")?;
            let end = parse_workout_time(&entry.workout_end, "workout_end")?;
            let check_in = date.and_time(start).and_utc();
            let mut check_out = date.and_time(end).and_utc();
            if check_out < check_in {
                // Checkout rolled past midnight.
                check_out += Duration::days(1);
            }

            if session_exists(&tx, student.id, date, check_in)? {
                return Ok(false);
            }

            let mut session = Session::new_open(student.id, check_in);
            session.close_at(check_out);
            insert_session(&tx, &session)?;
            recompute_daily_stats(&tx, student.id, date)?;
            Ok(true)
        })();

        match outcome {
            Ok(true) => summary.sessions_created += 1,
            Ok(false) => {}
            Err(err) => {
                warn!("Skipping legacy entry for '{}': {err}", entry.full_name);
                summary.entries_skipped += 1;
            }
        }
    }

    tx.commit()?;
    Ok(summary)
}

impl Database {
    /// Parses a legacy day-log (JSON array of entries) and imports it for the
    /// given calendar date.
    pub async fn import_legacy_day(&self, json: String, date: NaiveDate) -> Result<ImportSummary> {
        let entries: Vec<LegacyEntry> = serde_json::from_str(&json).map_err(|err| {
            Error::InvalidRecord(format!("day-log for {} is not valid JSON: {err}", date_to_string(date)))
        })?;
        self.execute(move |conn| import_day(conn, &entries, date))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::list_students;
    use crate::db::test_conn;
    use rusqlite::params;

    fn entry(name: &str, id: &str, start: &str, end: &str) -> LegacyEntry {
        LegacyEntry {
            full_name: name.into(),
            student_id: id.into(),
            enrolled_block: "stem 241".into(),
            pe_course: "pedu1".into(),
            workout_start: start.into(),
            workout_end: end.into(),
        }
    }

    #[test]
    fn student_no_salvage_rules() {
        assert_eq!(clean_student_no("2023-123456").unwrap(), "2023-123456");
        assert_eq!(clean_student_no(" 2023 - 123456 ").unwrap(), "2023-123456");
        assert_eq!(clean_student_no("id: 2023 no 123456x").unwrap(), "2023-123456");
        assert!(matches!(
            clean_student_no("1364078561"),
            Err(Error::InvalidStudentNo(_))
        ));
        assert!(matches!(clean_student_no(""), Err(Error::InvalidStudentNo(_))));
    }

    #[test]
    fn names_are_cleaned_and_split() {
        assert_eq!(clean_name("WILTE V. DELA CRUZ"), "Wilte Dela Cruz");
        assert_eq!(
            split_full_name("wilte v. dela cruz").unwrap(),
            ("Wilte Dela".to_string(), "Cruz".to_string())
        );
        assert!(split_full_name("Cher").is_err());
    }

    #[test]
    fn import_creates_students_and_completed_sessions() {
        let mut conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let entries = vec![entry("Ana R. Reyes", "2023-123456", "09:00:00", "09:45:00")];

        let summary = import_day(&mut conn, &entries, date).unwrap();
        assert_eq!(summary.students_created, 1);
        assert_eq!(summary.sessions_created, 1);
        assert_eq!(summary.entries_skipped, 0);

        let students = list_students(&conn).unwrap();
        assert_eq!(students[0].first_name, "Ana");
        assert_eq!(students[0].block_section, "STEM241");
        assert_eq!(students[0].pe_course, PeCourse::PeduOne);

        let minutes: i64 = conn
            .query_row(
                "SELECT total_minutes FROM gym_daily_stats WHERE student_id = ?1 AND date = '2025-08-11'",
                params![students[0].id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(minutes, 45);
    }

    #[test]
    fn reimport_skips_duplicates() {
        let mut conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let entries = vec![entry("Ana Reyes", "2023-123456", "09:00:00", "09:45:00")];

        import_day(&mut conn, &entries, date).unwrap();
        let second = import_day(&mut conn, &entries, date).unwrap();
        assert_eq!(second.sessions_created, 0);
        assert_eq!(second.students_created, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM gym_sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn unsalvageable_id_skips_entry_without_aborting_the_day() {
        let mut conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let entries = vec![
            entry("Ana Reyes", "1364078561", "09:00:00", "09:45:00"),
            entry("Ben Cruz", "2023-654321", "10:00:00", "10:30:00"),
        ];

        let summary = import_day(&mut conn, &entries, date).unwrap();
        assert_eq!(summary.entries_skipped, 1);
        assert_eq!(summary.sessions_created, 1);
        assert_eq!(list_students(&conn).unwrap().len(), 1);
    }

    #[test]
    fn overnight_checkout_rolls_to_next_day() {
        let mut conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let entries = vec![entry("Ana Reyes", "2023-123456", "23:30:00", "00:15:00")];

        import_day(&mut conn, &entries, date).unwrap();
        let duration: i64 = conn
            .query_row("SELECT duration_minutes FROM gym_sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(duration, 45);
    }

    #[test]
    fn unknown_pe_course_maps_to_sentinel_and_is_counted() {
        let mut conn = test_conn();
        let date = NaiveDate::from_ymd_opt(2025, 8, 11).unwrap();
        let mut bad_course = entry("Ana Reyes", "2023-123456", "09:00:00", "09:30:00");
        bad_course.pe_course = "YOGA101".into();

        let summary = import_day(&mut conn, &[bad_course], date).unwrap();
        assert_eq!(summary.unmapped_courses, 1);
        assert_eq!(
            list_students(&conn).unwrap()[0].pe_course,
            PeCourse::NotEnrolled
        );
    }
}
