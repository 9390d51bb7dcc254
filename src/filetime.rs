// Sources:
// - https://learn.microsoft.com/windows/win32/api/minwinbase/ns-minwinbase-filetime
//
// NTFS timestamps are 64-bit counts of 100-nanosecond intervals since
// 1601-01-01 00:00:00 UTC, stored as two little-endian 32-bit halves.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::error::TimeError;

/// Text form used by every text-based output (CSV, body, JSON).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%z";

/// Microseconds between 1601-01-01 and the Unix epoch.
const EPOCH_DELTA_MICROS: i64 = 11_644_473_600_000_000;

/// Convert the two halves of a FILETIME into a UTC calendar timestamp.
///
/// Sub-microsecond precision is truncated. Fails (never panics) when the
/// resulting instant is not representable.
pub fn decode_filetime(low: u32, high: u32) -> Result<DateTime<Utc>, TimeError> {
    let ticks = ((high as u64) << 32) | low as u64;
    let micros_since_1601 = (ticks / 10) as i64;
    let unix_micros = micros_since_1601 - EPOCH_DELTA_MICROS;
    let secs = unix_micros.div_euclid(1_000_000);
    let nanos = (unix_micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or(TimeError(ticks))
}

/// Inverse of [`decode_filetime`], used to build test fixtures.
pub fn encode_filetime(ts: DateTime<Utc>) -> (u32, u32) {
    let ticks = ((ts.timestamp_micros() + EPOCH_DELTA_MICROS) * 10) as u64;
    (ticks as u32, (ticks >> 32) as u32)
}

/// An all-zero FILETIME decodes to the 1601 epoch; consumers must treat such
/// a value as "never set", not as a real event.
pub fn is_epoch_sentinel(ts: &DateTime<Utc>) -> bool {
    ts.year() == 1601
}

/// Render a timestamp in the [`TIMESTAMP_FORMAT`] wire form.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
