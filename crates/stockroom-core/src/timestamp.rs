//! Epoch-millisecond conversions.
//!
//! SQLite stores every timestamp as an INTEGER of milliseconds since the
//! Unix epoch so that `ORDER BY entry_date` sorts chronologically.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Milliseconds since the Unix epoch.
#[inline]
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts a stored value back to a timestamp.
///
/// `field` names the column in the error if the value is out of chrono's range.
pub fn from_millis(field: &str, millis: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("{} is not a representable timestamp", millis),
    })
}

/// Same as [`from_millis`] for nullable columns.
pub fn from_millis_opt(
    field: &str,
    millis: Option<i64>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    millis.map(|m| from_millis(field, m)).transpose()
}
