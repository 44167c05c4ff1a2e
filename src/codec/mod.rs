//! Payload codecs for the vault's binary record formats.
//!
//! Everything here is independent of framing: these functions build and
//! parse the byte payloads carried inside a [`crate::protocol::Message`].
//!
//! - [`credentials`] - UTF-16LE offset-table records for store/lookup
//! - [`status`] - lock state from a device status push
//! - [`date`] - the 12-byte set-date payload

pub mod credentials;
pub mod date;
pub mod status;

pub use credentials::{decode_credentials, encode_credentials, encode_query, Credentials, ABSENT_FIELD};
pub use date::{encode_date, DATE_PAYLOAD_SIZE};
pub use status::{lock_state, parse_lock_status};

/// Raw 2-byte packet that resets the device's flip-bit expectation.
///
/// Written once before a fresh exchange sequence so the device accepts the
/// first message regardless of prior aborted transmissions. This is not a
/// framed message; send it via [`crate::session::Session::send_raw`].
pub const FLIP_BIT_RESET: [u8; 2] = [0xFF, 0xFF];
