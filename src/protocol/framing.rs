//! Fragmentation codec between logical messages and 64-byte frames.
//!
//! A message is laid out as one contiguous byte stream, a 4-byte sub-header
//! (command u16 LE, payload length u16 LE) followed by the payload, and cut
//! into chunks of at most [`MAX_FRAGMENT_PAYLOAD`] bytes, one frame per
//! chunk. The sub-header is never special-cased: it simply lands at the
//! start of fragment 0 and may spill into fragment 1 for large payloads.
//!
//! The codec carries the session's flip bit, toggled exactly once per
//! [`FrameCodec::serialize`] call so the device can detect stale
//! retransmissions.
//!
//! # Example
//!
//! ```
//! use vaultlink::protocol::{Command, FrameCodec, Message};
//!
//! let mut codec = FrameCodec::new();
//! let msg = Message::with_payload(Command::Ping, vec![10, 20, 30, 40]);
//! let frames = codec.serialize(&msg);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(FrameCodec::deserialize(&frames), Some(msg));
//! ```

use super::command::Command;
use super::frame::{Frame, MAX_FRAGMENTS, MAX_FRAGMENT_PAYLOAD};
use super::message::Message;

/// Sub-header size: command u16 + length u16, both little-endian.
pub const SUBHEADER_SIZE: usize = 4;

/// Largest logical payload a single message can carry
/// (16 fragments of 60 bytes, minus the sub-header).
pub const MAX_MESSAGE_PAYLOAD: usize = MAX_FRAGMENTS * MAX_FRAGMENT_PAYLOAD - SUBHEADER_SIZE;

/// Stateless fragmentation plus the per-session flip bit.
#[derive(Debug, Default)]
pub struct FrameCodec {
    flip: bool,
}

impl FrameCodec {
    /// Create a codec with the flip bit cleared.
    pub fn new() -> Self {
        Self { flip: false }
    }

    /// Fragment a message into transport frames.
    ///
    /// Always emits at least one frame (the sub-header alone fills 4 bytes).
    /// Toggles the flip bit for the next call.
    pub fn serialize(&mut self, msg: &Message) -> Vec<Frame> {
        let payload = msg.payload();
        debug_assert!(payload.len() <= MAX_MESSAGE_PAYLOAD);

        let mut stream = Vec::with_capacity(SUBHEADER_SIZE + payload.len());
        stream.extend_from_slice(&msg.command().code().to_le_bytes());
        stream.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        stream.extend_from_slice(payload);

        let flip = self.flip;
        self.flip = !self.flip;

        let count = stream.len().div_ceil(MAX_FRAGMENT_PAYLOAD);
        stream
            .chunks(MAX_FRAGMENT_PAYLOAD)
            .enumerate()
            .map(|(i, chunk)| Frame::new(flip, i as u8, count as u8, chunk))
            .collect()
    }

    /// Reassemble an ordered frame sequence into a message.
    ///
    /// Returns `None` on any malformation: fragment count mismatch,
    /// insufficient data for the declared length, or an unrecognized
    /// command. No partial message ever surfaces.
    pub fn deserialize(frames: &[Frame]) -> Option<Message> {
        let first = frames.first()?;
        let count = first.fragment_count() as usize;
        if count != frames.len() {
            tracing::warn!(
                reported = count,
                received = frames.len(),
                "fragment count mismatch"
            );
            return None;
        }

        let mut stream = Vec::with_capacity(count * MAX_FRAGMENT_PAYLOAD);
        for frame in frames {
            stream.extend_from_slice(frame.chunk());
        }
        if stream.len() < SUBHEADER_SIZE {
            tracing::warn!(len = stream.len(), "reassembled stream shorter than sub-header");
            return None;
        }

        let code = u16::from_le_bytes([stream[0], stream[1]]);
        let len = u16::from_le_bytes([stream[2], stream[3]]) as usize;
        if len > stream.len() - SUBHEADER_SIZE {
            tracing::warn!(
                declared = len,
                available = stream.len() - SUBHEADER_SIZE,
                "not enough data for declared length"
            );
            return None;
        }
        let command = Command::from_u16(code)?;
        Some(Message::with_payload(
            command,
            stream[SUBHEADER_SIZE..SUBHEADER_SIZE + len].to_vec(),
        ))
    }
}
