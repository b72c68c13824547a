//! Calendar fields derived from the transaction start time.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub const TRANSACTION_START_TIME: &str = "TransactionStartTime";
pub const TRANSACTION_HOUR: &str = "Transaction_Hour";
pub const TRANSACTION_DAY: &str = "Transaction_Day";
pub const TRANSACTION_MONTH: &str = "Transaction_Month";
pub const TRANSACTION_YEAR: &str = "Transaction_Year";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFeatures {
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

/// Parse an ISO-8601 timestamp. Zoned values keep their local wall-clock
/// time; a bare date is taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn extract_time_features(raw: &str) -> Option<TimeFeatures> {
    parse_timestamp(raw).map(|dt| TimeFeatures {
        hour: dt.hour(),
        day: dt.day(),
        month: dt.month(),
        year: dt.year(),
    })
}

// Appends Transaction_Hour, Transaction_Day, Transaction_Month and
// Transaction_Year. The first missing or unparseable timestamp aborts with
// a ParseError carrying the row.
pub fn extract_transaction_time_features(df: &DataFrame) -> Result<DataFrame> {
    let raw = df.column(TRANSACTION_START_TIME)?.str()?;
    let features = raw
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .and_then(extract_time_features)
                .ok_or_else(|| PipelineError::Parse {
                    row,
                    value: value.unwrap_or_default().to_string(),
                })
        })
        .collect::<Result<Vec<TimeFeatures>>>()?;

    let field = |name: &str, f: fn(&TimeFeatures) -> f64| {
        Series::new(name.into(), features.iter().map(f).collect::<Vec<f64>>())
    };
    let mut out = df.clone();
    out.with_column(field(TRANSACTION_HOUR, |f| f.hour as f64))?;
    out.with_column(field(TRANSACTION_DAY, |f| f.day as f64))?;
    out.with_column(field(TRANSACTION_MONTH, |f| f.month as f64))?;
    out.with_column(field(TRANSACTION_YEAR, |f| f.year as f64))?;
    Ok(out)
}
