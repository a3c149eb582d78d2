//! Core library for the campus gym attendance tracker: RFID check-in and
//! check-out with a daily time cap, nightly maintenance over stale and
//! over-long sessions, per-day aggregates, and repair passes for duplicate
//! students and legacy JSON logs.

pub mod attendance;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod reconcile;
pub mod stats;

pub use attendance::{AttendanceController, StudentStatus, TapAction, TapOutcome};
pub use db::{Database, DailyStats, NewStudent, PeCourse, Session, Student};
pub use error::{Error, ErrorKind, Result};
pub use maintenance::{CapReport, MaintenanceReport};
pub use reconcile::{ImportSummary, MergePlan};
pub use stats::{HeatmapCell, StudentStats};

/// Maximum gym time per student per calendar day, in minutes.
pub const DAILY_CAP_MINUTES: u32 = 120;
