//! Per-student summaries read from the daily aggregate cache: a
//! GitHub-style weekday heatmap plus session averages and streaks.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::db::repositories::{
    completed_sessions_for_student, find_student_by_no, stats_in_range,
};
use crate::db::{DailyStats, Database, Student};
use crate::error::{Error, Result};

const HEATMAP_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    pub date: NaiveDate,
    pub count: u32,
    pub level: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub student: Student,
    pub total_days_active: u32,
    pub average_session_minutes: u32,
    pub longest_session_minutes: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub heatmap: Vec<HeatmapCell>,
}

/// Intensity buckets: 0 for no activity, then 1-30, 31-60, 61-90, 91+.
pub(crate) fn intensity_level(minutes: u32) -> u8 {
    match minutes {
        0 => 0,
        1..=30 => 1,
        31..=60 => 2,
        61..=90 => 3,
        _ => 4,
    }
}

/// One cell per workday (Mon-Fri) in `[from, to]`, zero-filled for days
/// without an aggregate row.
pub fn build_heatmap(stats: &[DailyStats], from: NaiveDate, to: NaiveDate) -> Vec<HeatmapCell> {
    let mut cells = Vec::new();
    let mut current = from;
    let mut idx = 0;
    while current <= to {
        if current.weekday().number_from_monday() <= 5 {
            while idx < stats.len() && stats[idx].date < current {
                idx += 1;
            }
            let minutes = if idx < stats.len() && stats[idx].date == current {
                stats[idx].total_minutes
            } else {
                0
            };
            cells.push(HeatmapCell {
                date: current,
                count: minutes,
                level: intensity_level(minutes),
            });
        }
        current += Duration::days(1);
    }
    cells
}

/// Streaks of consecutive active calendar days. The current streak is the
/// run ending at the most recent active day, counted only while that day is
/// today or yesterday.
pub(crate) fn streaks(active_dates: &[NaiveDate], today: NaiveDate) -> (u32, u32) {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for &date in active_dates {
        run = match previous {
            Some(prev) if date == prev + Duration::days(1) => run + 1,
            Some(prev) if date == prev => run,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }

    let current = match previous {
        Some(last) if today - last <= Duration::days(1) => run,
        _ => 0,
    };
    (current, longest)
}

impl Database {
    pub async fn student_stats(&self, student_no: &str) -> Result<StudentStats> {
        let student_no = student_no.to_string();
        self.execute(move |conn| {
            let student = find_student_by_no(conn, &student_no)?
                .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;

            let sessions = completed_sessions_for_student(conn, student.id)?;
            let mut active_dates: Vec<NaiveDate> = sessions.iter().map(|s| s.date).collect();
            active_dates.dedup();

            let total_minutes: u64 = sessions.iter().map(|s| u64::from(s.duration_minutes)).sum();
            let average = if sessions.is_empty() {
                0
            } else {
                (total_minutes / sessions.len() as u64) as u32
            };
            let longest_session = sessions.iter().map(|s| s.duration_minutes).max().unwrap_or(0);

            let today = Utc::now().date_naive();
            let (current_streak, longest_streak) = streaks(&active_dates, today);

            let from = today - Duration::days(HEATMAP_DAYS);
            let rows = stats_in_range(conn, student.id, from, today)?;
            let heatmap = build_heatmap(&rows, from, today);

            Ok(StudentStats {
                student,
                total_days_active: active_dates.len() as u32,
                average_session_minutes: average,
                longest_session_minutes: longest_session,
                current_streak,
                longest_streak,
                heatmap,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, day).unwrap()
    }

    #[test]
    fn intensity_levels_match_bucket_bounds() {
        assert_eq!(intensity_level(0), 0);
        assert_eq!(intensity_level(1), 1);
        assert_eq!(intensity_level(30), 1);
        assert_eq!(intensity_level(31), 2);
        assert_eq!(intensity_level(60), 2);
        assert_eq!(intensity_level(90), 3);
        assert_eq!(intensity_level(91), 4);
        assert_eq!(intensity_level(120), 4);
    }

    #[test]
    fn heatmap_skips_weekends_and_zero_fills() {
        // 2025-08-11 is a Monday.
        let stats = vec![DailyStats {
            student_id: 1,
            date: date(12),
            total_sessions: 1,
            total_minutes: 45,
        }];
        let cells = build_heatmap(&stats, date(11), date(17));
        // Mon-Fri only.
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], HeatmapCell { date: date(11), count: 0, level: 0 });
        assert_eq!(cells[1], HeatmapCell { date: date(12), count: 45, level: 2 });
        assert!(cells.iter().all(|c| c.date.weekday().number_from_monday() <= 5));
    }

    #[test]
    fn streaks_count_consecutive_days() {
        let dates = vec![date(4), date(5), date(6), date(11), date(12)];
        // Two days after the last active day: current streak is broken.
        let (current, longest) = streaks(&dates, date(14));
        assert_eq!(current, 0);
        assert_eq!(longest, 3);

        // Checked in yesterday: the trailing run still counts.
        let (current, longest) = streaks(&dates, date(13));
        assert_eq!(current, 2);
        assert_eq!(longest, 3);
    }

    #[test]
    fn empty_history_yields_zero_streaks() {
        assert_eq!(streaks(&[], date(11)), (0, 0));
    }
}
