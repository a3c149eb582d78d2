use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};

pub fn to_minutes_i64(value: u32) -> i64 {
    i64::from(value)
}

pub fn to_minutes_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Database(anyhow!("{field} holds out-of-range value {value}")))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
        .map_err(Error::Database)
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("failed to parse {field}"))
        .map_err(Error::Database)
}

pub fn date_to_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Last representable instant of a calendar day, used as the closing bound
/// for sessions left open past midnight.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("23:59:59 is always a valid time")
        .and_utc()
}
