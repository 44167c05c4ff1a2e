//! Transport adapter contract.
//!
//! The session does not own a radio; it drives any link that is
//! byte-oriented, frame-preserving, notification-capable, and
//! connection-oriented through the [`VaultTransport`] trait. A platform
//! adapter (BLE GATT on Android/Linux, a loopback fake in tests) issues the
//! actual I/O and delivers completion and lifecycle callbacks as
//! [`TransportEvent`]s on the channel returned by
//! [`VaultTransport::connect`].
//!
//! The adapter must never block in its event delivery path; the session's
//! pump task is the sole consumer and handles all sequencing.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Vendor communication service exposed by the vault.
pub const COMM_SERVICE_UUID: &str = "2566af2c-91bd-49fd-8ebb-020fa873044f";

/// Characteristic the vault notifies and answers reads on.
pub const READ_CHAR_UUID: &str = "4c64e90a-5f9c-4d6b-9c29-bdaa6141f9f7";

/// Characteristic the session writes frames to.
pub const WRITE_CHAR_UUID: &str = "fe8f1a02-6311-475f-a296-553e3566b895";

/// Client characteristic configuration descriptor (notification enable).
pub const CCC_DESCRIPTOR_UUID: &str = "00002902-0000-1000-8000-00805f9b34fb";

/// Status value meaning the operation succeeded (GATT convention).
pub const STATUS_OK: i32 = 0;

/// Asynchronous event delivered by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Physical link established.
    Connected,
    /// Service discovery finished; reports whether the vault's
    /// communication service is present.
    ServicesDiscovered { has_comm_service: bool },
    /// The notification-enable descriptor write completed.
    DescriptorWritten { status: i32 },
    /// MTU negotiation completed.
    MtuChanged { status: i32 },
    /// A characteristic write completed.
    WriteCompleted { status: i32 },
    /// A characteristic read completed.
    ReadCompleted { status: i32, data: Vec<u8> },
    /// The device pushed a notification frame.
    Notification { data: Vec<u8> },
    /// Physical link lost or closed.
    Disconnected,
}

/// Platform link primitives the session requires.
///
/// Each request method resolves when the request has been *issued*; its
/// outcome arrives later as a [`TransportEvent`]. An `Err` from a request
/// method means the request could not even be submitted.
#[async_trait]
pub trait VaultTransport: Send + Sync {
    /// Open the physical link and return the event stream.
    ///
    /// The stream ends (sender dropped) or yields
    /// [`TransportEvent::Disconnected`] when the link is gone.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Start service discovery; completes via
    /// [`TransportEvent::ServicesDiscovered`].
    async fn discover_services(&self) -> Result<()>;

    /// Enable notifications on the read characteristic (CCC descriptor
    /// write); completes via [`TransportEvent::DescriptorWritten`].
    async fn subscribe_notifications(&self) -> Result<()>;

    /// Request an enlarged MTU; completes via [`TransportEvent::MtuChanged`].
    async fn request_mtu(&self, mtu: u16) -> Result<()>;

    /// Write one frame (or raw packet) to the write characteristic;
    /// completes via [`TransportEvent::WriteCompleted`].
    async fn write_characteristic(&self, data: &[u8]) -> Result<()>;

    /// Read the current value of the read characteristic; completes via
    /// [`TransportEvent::ReadCompleted`].
    async fn read_characteristic(&self) -> Result<()>;

    /// Tear the link down. Idempotent.
    async fn disconnect(&self);
}
