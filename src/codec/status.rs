//! Device status parsing.

use crate::protocol::{Command, Frame, FrameCodec};

/// Status payload length the firmware sends.
const STATUS_PAYLOAD_LEN: usize = 5;

/// Unlocked bit in status byte 0.
const UNLOCKED_BIT: u8 = 0x04;

/// Lock state from a status message payload.
///
/// Only the exact 5-byte payload is authoritative. The device reports
/// "unlocked" by setting bit `0x4` of byte 0, so a clear bit means locked.
pub fn lock_state(payload: &[u8]) -> Option<bool> {
    (payload.len() == STATUS_PAYLOAD_LEN).then(|| payload[0] & UNLOCKED_BIT == 0)
}

/// Try to read the lock state from a raw notification frame.
///
/// Only a well-formed single-frame [`Command::DeviceStatus`] message with a
/// 5-byte payload is authoritative; everything else returns `None`.
pub fn parse_lock_status(data: &[u8]) -> Option<bool> {
    let frame = Frame::from_bytes(data)?;
    let msg = FrameCodec::deserialize(std::slice::from_ref(&frame))?;
    if msg.command() != Command::DeviceStatus {
        return None;
    }
    lock_state(msg.payload())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn status_frame(byte0: u8) -> Vec<u8> {
        let mut codec = FrameCodec::new();
        let msg = Message::with_payload(Command::DeviceStatus, vec![byte0, 0, 0, 0, 0]);
        codec.serialize(&msg)[0].as_bytes().to_vec()
    }

    #[test]
    fn test_clear_bit_means_locked() {
        assert_eq!(parse_lock_status(&status_frame(0x00)), Some(true));
    }

    #[test]
    fn test_set_bit_means_unlocked() {
        assert_eq!(parse_lock_status(&status_frame(0x04)), Some(false));
    }

    #[test]
    fn test_other_bits_ignored() {
        assert_eq!(parse_lock_status(&status_frame(0xFB)), Some(true));
        assert_eq!(parse_lock_status(&status_frame(0xFF)), Some(false));
    }

    #[test]
    fn test_wrong_payload_length_is_none() {
        let mut codec = FrameCodec::new();
        let msg = Message::with_payload(Command::DeviceStatus, vec![0u8; 4]);
        let bytes = codec.serialize(&msg)[0].as_bytes().to_vec();
        assert_eq!(parse_lock_status(&bytes), None);
    }

    #[test]
    fn test_wrong_command_is_none() {
        let mut codec = FrameCodec::new();
        let msg = Message::with_payload(Command::Ping, vec![0u8; 5]);
        let bytes = codec.serialize(&msg)[0].as_bytes().to_vec();
        assert_eq!(parse_lock_status(&bytes), None);
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_lock_status(&[0x12, 0x34]), None);
        assert_eq!(parse_lock_status(&[0xFFu8; 64]), None);
    }

    #[test]
    fn test_lock_state_requires_exact_length() {
        assert_eq!(lock_state(&[0x00, 0, 0, 0, 0]), Some(true));
        assert_eq!(lock_state(&[0x04, 0, 0, 0, 0]), Some(false));
        assert_eq!(lock_state(&[0x04, 0, 0, 0]), None);
        assert_eq!(lock_state(&[]), None);
    }
}
