use serde::Serialize;
use thiserror::Error;

/// Domain errors surfaced by check-in/check-out, registration, and
/// reconciliation operations. Storage failures are wrapped in `Database`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error("no student registered for RFID tag {0}")]
    RfidNotFound(String),
    #[error("student {0} already has an active session")]
    AlreadyCheckedIn(String),
    #[error("student {0} has no active session")]
    NoActiveSession(String),
    #[error("student {0} has reached the 120-minute daily limit")]
    DailyLimitReached(String),
    #[error("student number {0} is already registered")]
    DuplicateStudentNo(String),
    #[error("RFID tag {0} is already assigned")]
    DuplicateRfid(String),
    #[error("invalid student number '{0}': expected format 20YY-NNNNNN")]
    InvalidStudentNo(String),
    #[error("unknown PE course '{0}'")]
    UnknownPeCourse(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Coarse classification for callers rendering user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    LimitExceeded,
    Validation,
    Database,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StudentNotFound(_) | Error::RfidNotFound(_) | Error::NoActiveSession(_) => {
                ErrorKind::NotFound
            }
            Error::AlreadyCheckedIn(_)
            | Error::DuplicateStudentNo(_)
            | Error::DuplicateRfid(_) => ErrorKind::Conflict,
            Error::DailyLimitReached(_) => ErrorKind::LimitExceeded,
            Error::InvalidStudentNo(_) | Error::UnknownPeCourse(_) | Error::InvalidRecord(_) => {
                ErrorKind::Validation
            }
            Error::Database(_) => ErrorKind::Database,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(anyhow::Error::new(err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
