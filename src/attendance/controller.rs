use chrono::Utc;
use log::info;
use serde::Serialize;

use crate::db::repositories::{
    active_session, completed_minutes_on, find_student_by_no, find_student_by_rfid,
};
use crate::db::{Database, Session, Student};
use crate::error::{Error, Result};

use super::ops;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TapAction {
    CheckedIn,
    CheckedOut,
}

/// Result of one RFID tap: the transition taken plus the figures the kiosk
/// screen renders afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapOutcome {
    pub action: TapAction,
    pub student: Student,
    pub session: Session,
    pub daily_minutes: u32,
    pub remaining_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatus {
    pub student: Student,
    pub active_session: Option<Session>,
    pub daily_minutes: u32,
    pub remaining_minutes: u32,
    pub can_check_in: bool,
}

/// Front door for the check-in/check-out state machine. Each operation runs
/// as a single task on the database worker, inside one transaction, so two
/// concurrent taps for the same student cannot race into two open sessions.
#[derive(Clone)]
pub struct AttendanceController {
    db: Database,
}

impl AttendanceController {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn check_in(&self, student_no: &str) -> Result<Session> {
        let student_no = student_no.to_string();
        let session = self
            .db
            .execute(move |conn| {
                let student = find_student_by_no(conn, &student_no)?
                    .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;
                ops::check_in(conn, &student, Utc::now())
            })
            .await?;
        info!("Checked in session {} at {}", session.id, session.check_in_at);
        Ok(session)
    }

    pub async fn check_out(&self, student_no: &str) -> Result<Session> {
        let student_no = student_no.to_string();
        let session = self
            .db
            .execute(move |conn| {
                let student = find_student_by_no(conn, &student_no)?
                    .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;
                ops::check_out(conn, &student, Utc::now())
            })
            .await?;
        info!(
            "Checked out session {} after {}",
            session.id,
            session.duration_formatted()
        );
        Ok(session)
    }

    /// RFID tap: checks out if a session is open, otherwise checks in. The
    /// explicit `check_in`/`check_out` calls stay strict; only the tap flow
    /// toggles.
    pub async fn tap(&self, rfid: &str) -> Result<TapOutcome> {
        let rfid = rfid.to_string();
        self.db
            .execute(move |conn| {
                let student = find_student_by_rfid(conn, &rfid)?
                    .ok_or_else(|| Error::RfidNotFound(rfid.clone()))?;
                let now = Utc::now();

                let (action, session) = match active_session(conn, student.id)? {
                    Some(_) => (TapAction::CheckedOut, ops::check_out(conn, &student, now)?),
                    None => (TapAction::CheckedIn, ops::check_in(conn, &student, now)?),
                };

                let daily = completed_minutes_on(conn, student.id, now.date_naive())?;
                let remaining = ops::remaining_minutes(conn, student.id, now.date_naive())?;
                Ok(TapOutcome {
                    action,
                    daily_minutes: daily,
                    remaining_minutes: remaining,
                    student,
                    session,
                })
            })
            .await
    }

    pub async fn status(&self, student_no: &str) -> Result<StudentStatus> {
        let student_no = student_no.to_string();
        self.db
            .execute(move |conn| {
                let student = find_student_by_no(conn, &student_no)?
                    .ok_or_else(|| Error::StudentNotFound(student_no.clone()))?;
                let today = Utc::now().date_naive();
                let active = active_session(conn, student.id)?;
                let daily = completed_minutes_on(conn, student.id, today)?;
                let remaining = ops::remaining_minutes(conn, student.id, today)?;
                Ok(StudentStatus {
                    daily_minutes: daily,
                    remaining_minutes: remaining,
                    can_check_in: active.is_none() && remaining > 0,
                    active_session: active,
                    student,
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewStudent, PeCourse};
    use crate::db::repositories::insert_session;
    use crate::DAILY_CAP_MINUTES;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db = Database::new(dir.path().join("gymlog.sqlite3")).expect("open database");
        (db, dir)
    }

    async fn register(db: &Database, rfid: &str) -> Student {
        db.register_student(NewStudent {
            student_no: "2023-123456".into(),
            first_name: "Ana".into(),
            last_name: "Reyes".into(),
            pe_course: PeCourse::PeduOne,
            block_section: "STEM241".into(),
            rfid: Some(rfid.into()),
        })
        .await
        .unwrap()
    }

    // A completed session today that exhausts the daily cap.
    async fn exhaust_cap(db: &Database, student_id: i64) {
        db.execute(move |conn| {
            let check_in = Utc::now();
            let mut session = Session::new_open(student_id, check_in);
            session.close_at(check_in + Duration::minutes(i64::from(DAILY_CAP_MINUTES)));
            insert_session(conn, &session)
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn tap_toggles_between_check_in_and_check_out() {
        let (db, _dir) = open_db();
        let controller = AttendanceController::new(db.clone());
        register(&db, "AB12").await;

        let first = controller.tap("AB12").await.unwrap();
        assert_eq!(first.action, TapAction::CheckedIn);
        assert!(first.session.is_active);
        assert_eq!(first.daily_minutes, 0);

        let second = controller.tap("AB12").await.unwrap();
        assert_eq!(second.action, TapAction::CheckedOut);
        assert!(!second.session.is_active);
        assert_eq!(second.session.id, first.session.id);
        assert_eq!(
            second.remaining_minutes,
            DAILY_CAP_MINUTES - second.daily_minutes
        );
    }

    #[tokio::test]
    async fn tap_with_unknown_rfid_is_not_found() {
        let (db, _dir) = open_db();
        let controller = AttendanceController::new(db);

        let err = controller.tap("ZZZZ").await.unwrap_err();
        assert!(matches!(err, Error::RfidNotFound(_)));
    }

    #[tokio::test]
    async fn tap_in_at_the_daily_cap_is_rejected() {
        let (db, _dir) = open_db();
        let controller = AttendanceController::new(db.clone());
        let student = register(&db, "AB12").await;
        exhaust_cap(&db, student.id).await;

        let err = controller.tap("AB12").await.unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached(_)));
    }

    #[tokio::test]
    async fn status_blocks_check_in_while_a_session_is_open() {
        let (db, _dir) = open_db();
        let controller = AttendanceController::new(db.clone());
        register(&db, "AB12").await;

        let status = controller.status("2023-123456").await.unwrap();
        assert!(status.can_check_in);
        assert!(status.active_session.is_none());
        assert_eq!(status.remaining_minutes, DAILY_CAP_MINUTES);

        controller.check_in("2023-123456").await.unwrap();
        let status = controller.status("2023-123456").await.unwrap();
        assert!(!status.can_check_in);
        assert!(status.active_session.is_some());
    }

    #[tokio::test]
    async fn status_shows_no_headroom_once_capped() {
        let (db, _dir) = open_db();
        let controller = AttendanceController::new(db.clone());
        let student = register(&db, "AB12").await;
        exhaust_cap(&db, student.id).await;

        let status = controller.status("2023-123456").await.unwrap();
        assert_eq!(status.daily_minutes, DAILY_CAP_MINUTES);
        assert_eq!(status.remaining_minutes, 0);
        assert!(!status.can_check_in);
    }
}
