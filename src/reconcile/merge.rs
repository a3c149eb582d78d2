use std::cmp::Reverse;
use std::collections::BTreeMap;

use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::helpers::end_of_day;
use crate::db::models::{is_valid_student_no, PeCourse, Student};
use crate::db::repositories::{
    active_session, delete_student, distinct_session_dates, find_student_by_id, list_students,
    recompute_daily_stats, repoint_sessions, update_session_close, update_student_profile,
};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::DAILY_CAP_MINUTES;

/// Decision for one group of same-named students: everything merges into the
/// primary, which also absorbs the best profile fields from the group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePlan {
    pub primary_id: i64,
    pub pe_course: PeCourse,
    pub block_section: String,
    pub rfid: Option<String>,
    pub duplicate_ids: Vec<i64>,
}

fn normalize_name(first: &str, last: &str) -> String {
    format!(
        "{}::{}",
        last.trim().to_lowercase(),
        first.trim().to_lowercase()
    )
}

/// Pattern rank for a student number; lower is preferred. Department-issued
/// numbers (`202Y-140NNN` / `202Y-040NNN`) beat other well-formed numbers,
/// which beat malformed ones; an empty value ranks last.
fn student_no_rank(student_no: &str) -> u8 {
    if student_no.is_empty() {
        return 3;
    }
    if !is_valid_student_no(student_no) {
        return 2;
    }
    let bytes = student_no.as_bytes();
    if bytes[3].is_ascii_digit()
        && &student_no[0..3] == "202"
        && (&student_no[5..8] == "140" || &student_no[5..8] == "040")
    {
        0
    } else {
        1
    }
}

/// Picks the record every duplicate merges into. Priority order: best
/// student-number pattern, then presence of an RFID tag, then the most recent
/// registration, then the lowest row id as the final tie-break.
pub fn choose_primary(group: &[Student]) -> Option<&Student> {
    group.iter().min_by_key(|s| {
        (
            student_no_rank(&s.student_no),
            u8::from(s.rfid.is_none()),
            Reverse(s.registered_at),
            s.id,
        )
    })
}

/// Groups students by normalized name and produces one deterministic plan per
/// group with more than one record. Profile consolidation prefers a concrete
/// PE course over "not enrolled", any block over "N/A", and keeps the first
/// RFID found if the primary has none.
pub fn plan_merges(students: &[Student]) -> Vec<MergePlan> {
    let mut by_name: BTreeMap<String, Vec<Student>> = BTreeMap::new();
    for student in students {
        by_name
            .entry(normalize_name(&student.first_name, &student.last_name))
            .or_default()
            .push(student.clone());
    }

    let mut plans = Vec::new();
    for group in by_name.values() {
        if group.len() <= 1 {
            continue;
        }
        let primary = match choose_primary(group) {
            Some(primary) => primary.clone(),
            None => continue,
        };

        let mut pe_course = primary.pe_course;
        let mut block_section = primary.block_section.clone();
        let mut rfid = primary.rfid.clone();
        for student in group.iter() {
            if pe_course == PeCourse::NotEnrolled && student.pe_course != PeCourse::NotEnrolled {
                pe_course = student.pe_course;
            }
            if block_section == "N/A" && student.block_section != "N/A" {
                block_section = student.block_section.clone();
            }
            if rfid.is_none() {
                rfid = student.rfid.clone();
            }
        }

        plans.push(MergePlan {
            primary_id: primary.id,
            pe_course,
            block_section,
            rfid,
            duplicate_ids: group
                .iter()
                .filter(|s| s.id != primary.id)
                .map(|s| s.id)
                .collect(),
        });
    }
    plans
}

/// Applies one merge atomically: consolidates the primary's profile, repoints
/// every duplicate's sessions, deletes the duplicates (their aggregates
/// cascade away), and recomputes the primary's aggregates from scratch for
/// every date it now owns.
pub(crate) fn apply_merge(conn: &mut Connection, plan: &MergePlan) -> Result<()> {
    let tx = conn.transaction()?;

    if find_student_by_id(&tx, plan.primary_id)?.is_none() {
        return Err(Error::StudentNotFound(plan.primary_id.to_string()));
    }

    // Duplicates go first: a consolidated RFID must be released before the
    // primary can take it without tripping the unique index. A duplicate's
    // open session is closed the way the stale closer would close it, so
    // repointing cannot collide with an open session on the primary.
    for duplicate_id in &plan.duplicate_ids {
        if let Some(mut open) = active_session(&tx, *duplicate_id)? {
            let checkout = (open.check_in_at
                + chrono::Duration::minutes(i64::from(DAILY_CAP_MINUTES)))
            .min(end_of_day(open.date));
            open.close_at(checkout);
            update_session_close(&tx, &open)?;
        }
        repoint_sessions(&tx, *duplicate_id, plan.primary_id)?;
        delete_student(&tx, *duplicate_id)?;
    }

    update_student_profile(
        &tx,
        plan.primary_id,
        plan.pe_course,
        &plan.block_section,
        plan.rfid.as_deref(),
    )?;

    for date in distinct_session_dates(&tx, plan.primary_id)? {
        recompute_daily_stats(&tx, plan.primary_id, date)?;
    }

    tx.commit()?;
    Ok(())
}

impl Database {
    /// Reconciliation pass over the whole student table: merges records that
    /// share a normalized name. Failed groups are logged and skipped. Returns
    /// the number of duplicate records merged away.
    pub async fn merge_duplicate_students(&self) -> Result<u32> {
        self.execute(|conn| {
            let students = list_students(conn)?;
            let plans = plan_merges(&students);
            let mut merged = 0u32;
            for plan in &plans {
                match apply_merge(conn, plan) {
                    Ok(()) => {
                        merged += plan.duplicate_ids.len() as u32;
                        info!(
                            "Merged {} duplicate(s) into student {}",
                            plan.duplicate_ids.len(),
                            plan.primary_id
                        );
                    }
                    Err(err) => {
                        warn!("Skipping merge into student {}: {err}", plan.primary_id);
                    }
                }
            }
            Ok(merged)
        })
        .await
    }
}
