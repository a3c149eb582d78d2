mod controller;
mod ops;

pub use controller::{AttendanceController, StudentStatus, TapAction, TapOutcome};
