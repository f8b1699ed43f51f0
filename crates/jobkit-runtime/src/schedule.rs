//! Cron expression handling for recurring jobs.
//!
//! Expressions are evaluated in UTC by the `cron` crate. Standard 5-field
//! expressions are accepted and run at second 0.

use chrono::{DateTime, Utc};
use cron::Schedule;
use jobkit_protocols::EngineError;

/// Bring a 5-field expression to the 6-field form the `cron` crate expects.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    }
}

/// Parse and validate a cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, EngineError> {
    normalize_cron(expr)
        .parse::<Schedule>()
        .map_err(|e| EngineError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })
}

/// First occurrence strictly after `after`.
pub fn next_occurrence(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}
