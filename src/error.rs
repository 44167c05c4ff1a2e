//! Error types for vaultlink.

use thiserror::Error;

/// Main error type for all vaultlink operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Transport-level failure (connect, write, read, subscribe).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The device reported a non-zero status for a characteristic operation.
    #[error("Device status {0}")]
    DeviceStatus(i32),

    /// Protocol error (bad fragment sequence, truncated payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peripheral does not expose the vault communication service.
    #[error("Communication service not present")]
    NoCommService,

    /// Operation did not complete within its timeout.
    #[error("Operation timed out")]
    Timeout,

    /// Connection closed, session is permanently disconnected.
    #[error("Disconnected")]
    Disconnected,

    /// The device is locked; unlock it on the device and retry.
    #[error("Device locked")]
    Locked,

    /// The device answer did not match the request (wrong command or payload).
    #[error("Unexpected device answer: {0}")]
    UnexpectedAnswer(String),
}

/// Result type alias using VaultError.
pub type Result<T> = std::result::Result<T, VaultError>;
