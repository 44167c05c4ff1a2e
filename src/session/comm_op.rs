//! Session-internal communication states.

/// The latest transport event or control intent of a session.
///
/// The session publishes these through a latest-value stream: exactly one
/// `CommOp` is current at any time, and transient completions (`Read`,
/// `Write`, `ChangedChar`) must be observed by their waiter before the next
/// state replaces them; a waiter that misses one simply sees the next
/// state and times out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommOp {
    /// No usable link. Initial state, and terminal after a disconnect.
    Disconnected,
    /// MTU negotiation in progress during connection setup.
    ChangeMtu,
    /// Link ready, no operation in flight.
    Idle,
    /// An exclusive operation holds the session.
    OperationPending,
    /// A characteristic read was issued.
    ReadRequested,
    /// A characteristic write was issued.
    WriteRequested,
    /// A characteristic read completed.
    Read { status: i32, data: Vec<u8> },
    /// A characteristic write completed.
    Write { status: i32 },
    /// The device pushed a notification frame.
    ChangedChar { data: Vec<u8> },
}
