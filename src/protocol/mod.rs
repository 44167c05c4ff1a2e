//! Wire protocol: commands, messages, and the fragmentation codec.
//!
//! The link carries fixed 64-byte [`Frame`]s; a logical [`Message`] is
//! fragmented across one or more frames by [`FrameCodec`]. See the module
//! docs of [`framing`] for the byte layout.

pub mod command;
pub mod frame;
pub mod framing;
pub mod message;

pub use command::Command;
pub use frame::{Frame, FRAME_DATA_SIZE, FRAME_HEADER_SIZE, FRAME_SIZE, MAX_FRAGMENT_PAYLOAD};
pub use framing::{FrameCodec, MAX_MESSAGE_PAYLOAD, SUBHEADER_SIZE};
pub use message::Message;
