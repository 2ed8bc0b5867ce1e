//! Timestamp formatting helpers.
//!
//! Account validity and audit timestamps are exchanged with clients as
//! local-time strings in a single fixed layout.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Layout used for every timestamp string the API accepts or returns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC instant in the server's local time zone.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Current time formatted with [`TIMESTAMP_FORMAT`].
pub fn now_formatted() -> String {
    format_timestamp(&Utc::now())
}

/// Parse a local-time string in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .with_context(|| format!("timestamp must look like 2024-01-31 23:59:59, got {value:?}"))?;

    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .context("timestamp does not exist in the local time zone")?;

    Ok(local.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn format_then_parse_is_stable() {
        let parsed = parse_timestamp("2024-03-01 08:30:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-03-01 08:30:00");
    }

    #[test]
    fn parse_rejects_other_layouts() {
        assert!(parse_timestamp("2024/03/01").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn now_formatted_has_fixed_width() {
        assert_eq!(now_formatted().len(), "2024-03-01 08:30:00".len());
    }
}
