//! Set-date payload encoding.

use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Date payload size: six little-endian u16 fields.
pub const DATE_PAYLOAD_SIZE: usize = 12;

/// Encode a UTC instant as the device's 12-byte date payload:
/// year, month (1-based), day, hour, minute, second.
pub fn encode_date(now: DateTime<Utc>) -> Bytes {
    let fields = [
        now.year() as u16,
        now.month() as u16,
        now.day() as u16,
        now.hour() as u16,
        now.minute() as u16,
        now.second() as u16,
    ];
    fields
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect::<Vec<u8>>()
        .into()
}
