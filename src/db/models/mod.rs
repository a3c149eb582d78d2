mod daily_stats;
mod session;
mod student;

pub use daily_stats::DailyStats;
pub use session::Session;
pub use student::{is_valid_student_no, normalize_block_section, NewStudent, PeCourse, Student};
