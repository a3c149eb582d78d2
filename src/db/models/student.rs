use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// PE course enrollment. `NotEnrolled` is the explicit "N/A" sentinel used
/// when a student takes no PE class or a legacy record carried an unmapped
/// course code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PeCourse {
    PeduOne,
    PeduTwo,
    PeduTri,
    PeduFor,
    NotEnrolled,
}

impl PeCourse {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeCourse::PeduOne => "PEDUONE",
            PeCourse::PeduTwo => "PEDUTWO",
            PeCourse::PeduTri => "PEDUTRI",
            PeCourse::PeduFor => "PEDUFOR",
            PeCourse::NotEnrolled => "N/A",
        }
    }

    /// Accepts both canonical codes and the lowercase aliases found in the
    /// old JSON logs (`pedu1`..`pedu4`, `none`).
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PEDUONE" | "PEDU1" => Ok(PeCourse::PeduOne),
            "PEDUTWO" | "PEDU2" => Ok(PeCourse::PeduTwo),
            "PEDUTRI" | "PEDU3" => Ok(PeCourse::PeduTri),
            "PEDUFOR" | "PEDU4" => Ok(PeCourse::PeduFor),
            "N/A" | "NONE" | "" => Ok(PeCourse::NotEnrolled),
            other => Err(Error::UnknownPeCourse(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub student_no: String,
    pub first_name: String,
    pub last_name: String,
    pub pe_course: PeCourse,
    pub block_section: String,
    pub rfid: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Registration payload. `validated()` normalizes the block/section and
/// rejects malformed input before anything touches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub student_no: String,
    pub first_name: String,
    pub last_name: String,
    pub pe_course: PeCourse,
    pub block_section: String,
    pub rfid: Option<String>,
}

impl NewStudent {
    pub fn validated(mut self) -> Result<Self> {
        if !is_valid_student_no(&self.student_no) {
            return Err(Error::InvalidStudentNo(self.student_no));
        }
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        if self.first_name.is_empty() || self.last_name.is_empty() {
            return Err(Error::InvalidRecord("student name must not be empty".into()));
        }
        self.block_section = normalize_block_section(&self.block_section);
        if let Some(rfid) = &self.rfid {
            let trimmed = rfid.trim();
            if trimmed.is_empty() {
                self.rfid = None;
            } else {
                self.rfid = Some(trimmed.to_string());
            }
        }
        Ok(self)
    }
}

/// Checks the `20YY-NNNNNN` student number format (e.g. 2023-123456).
pub fn is_valid_student_no(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 11 {
        return false;
    }
    if &bytes[0..2] != b"20" || bytes[4] != b'-' {
        return false;
    }
    bytes[2..4].iter().all(u8::is_ascii_digit) && bytes[5..11].iter().all(u8::is_ascii_digit)
}

/// Uppercases and strips all whitespace, e.g. "stem 241" -> "STEM241".
pub fn normalize_block_section(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if cleaned.is_empty() || cleaned == "NONE" {
        "N/A".to_string()
    } else {
        cleaned
    }
}
