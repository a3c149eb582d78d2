use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Cached per-student per-day totals, derived entirely from completed
/// sessions. Never a source of truth: every mutation to a session triggers a
/// full recompute of the matching row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub student_id: i64,
    pub date: NaiveDate,
    pub total_sessions: u32,
    pub total_minutes: u32,
}
