//! Repair passes for historical data: deterministic duplicate-student
//! merging and import of the old per-day JSON attendance logs.

mod import;
mod merge;

pub use import::{ImportSummary, LegacyEntry};
pub use merge::{choose_primary, plan_merges, MergePlan};
