//! Logical message: a command plus its payload.
//!
//! Messages are immutable values with structural equality. Uses
//! `bytes::Bytes` for cheap payload sharing between the codec layers.
//!
//! # Example
//!
//! ```
//! use vaultlink::protocol::{Command, Message};
//!
//! let ping = Message::with_payload(Command::Ping, vec![10, 20, 30, 40]);
//! assert_eq!(ping.command(), Command::Ping);
//! assert_eq!(ping.payload(), &[10, 20, 30, 40]);
//! ```

use bytes::Bytes;

use super::command::Command;

/// A logical command with payload, independent of framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: Command,
    payload: Bytes,
}

impl Message {
    /// Create a message with no payload.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Bytes::new(),
        }
    }

    /// Create a message with a raw byte payload.
    pub fn with_payload(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Create a message whose payload is an ASCII string plus a trailing NUL.
    ///
    /// Non-ASCII characters are replaced with `?`, matching the device's
    /// single-byte string convention.
    pub fn with_ascii(command: Command, s: &str) -> Self {
        let mut payload = Vec::with_capacity(s.len() + 1);
        payload.extend(s.chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }));
        payload.push(0);
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The command opcode.
    #[inline]
    pub fn command(&self) -> Command {
        self.command
    }

    /// The payload bytes (empty when the command carries no data).
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// A cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Interpret the payload from `start` as a NUL-terminated ASCII string.
    ///
    /// Returns `None` when the payload is empty or not ASCII.
    pub fn payload_as_ascii(&self, start: usize) -> Option<String> {
        let data = self.payload.get(start..)?;
        let end = data.iter().position(|&b| b == 0)?;
        let s = std::str::from_utf8(&data[..end]).ok()?;
        s.is_ascii().then(|| s.to_string())
    }
}
