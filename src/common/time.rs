//! Simple time helpers used by multiple services.

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Current wall-clock time in UTC.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Current local time as an ISO-8601 string with microsecond precision.
pub fn now_iso() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Render a UTC instant as ISO-8601.
pub fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
