mod daily_stats;
mod sessions;
mod students;

pub(crate) use daily_stats::{recompute_daily_stats, stats_in_range};
pub(crate) use sessions::{
    active_session, completed_minutes_on, completed_sessions_for_student, distinct_session_dates,
    insert_session, open_sessions_before, repoint_sessions, session_exists, sessions_before,
    update_session_close,
};
pub(crate) use students::{
    delete_student, find_student_by_id, find_student_by_no, find_student_by_rfid, insert_student,
    list_students, update_student_profile,
};
