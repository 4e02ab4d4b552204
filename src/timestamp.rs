//! Cosmetic timestamp formatting. Out of scope for the core protocol, but
//! handy enough on record timestamps to keep alongside it.

use chrono::Timelike;

/// Render nanoseconds since the Unix epoch (UTC) as
/// `YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ`, always with exactly 9 fractional
/// digits.
pub fn format_timestamp(ts_ns: i64) -> String {
    let secs = ts_ns.div_euclid(1_000_000_000);
    let nanos = ts_ns.rem_euclid(1_000_000_000) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nanos)
        .expect("timestamp must be representable as a Unix timestamp");
    format!(
        "{}T{:02}:{:02}:{:02}.{:09}Z",
        dt.format("%Y-%m-%d"),
        dt.hour(),
        dt.minute(),
        dt.second(),
        nanos
    )
}
