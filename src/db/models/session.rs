use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One gym visit. Created open on check-in; closed on check-out or by the
/// maintenance routines. `duration_minutes` is derived from the two
/// timestamps whenever the session closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub student_id: i64,
    pub check_in_at: DateTime<Utc>,
    pub check_out_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub date: NaiveDate,
    pub is_active: bool,
}

impl Session {
    pub fn new_open(student_id: i64, check_in_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id,
            check_in_at,
            check_out_at: None,
            duration_minutes: 0,
            date: check_in_at.date_naive(),
            is_active: true,
        }
    }

    /// Closes the session at `check_out_at`, deriving the duration. A
    /// checkout earlier than the check-in (clock skew in imported data)
    /// clamps to zero minutes.
    pub fn close_at(&mut self, check_out_at: DateTime<Utc>) {
        let minutes = (check_out_at - self.check_in_at).num_minutes().max(0);
        self.check_out_at = Some(check_out_at);
        self.duration_minutes = minutes as u32;
        self.is_active = false;
    }

    pub fn duration_formatted(&self) -> String {
        let hours = self.duration_minutes / 60;
        let minutes = self.duration_minutes % 60;
        format!("{hours:02}:{minutes:02}")
    }
}
