//! # vaultlink
//!
//! Device communication engine for a BLE hardware password vault.
//!
//! The vault is reachable over a short-range wireless link that delivers
//! small, lossy, reorder-free 64-byte frames. This crate owns everything
//! between a platform transport and the application:
//!
//! - **Frame codec** ([`protocol`]): fragments a logical command+payload
//!   into fixed-size frames and reassembles the inverse, carrying the
//!   per-session flip bit the firmware uses to spot stale retransmissions.
//! - **Payload codec** ([`codec`]): the vault's binary record formats:
//!   UTF-16LE credential records with an offset-table header, the lock
//!   status payload, and the set-date payload.
//! - **Session** ([`session`]): one logical connection to one device; a
//!   state machine that serializes access through an idle gate and turns
//!   callback-delivered transport events into awaitable, timeout-bound
//!   operations.
//! - **Device operations** ([`ops`]): one-round-trip lookups, stores,
//!   pings, and clock pushes over a session.
//!
//! Platform links plug in through [`transport::VaultTransport`]; the
//! session only assumes a byte-oriented, frame-preserving,
//! notification-capable, connection-oriented adapter.
//!
//! ## Example
//!
//! ```ignore
//! use vaultlink::{ops, Session, SessionConfig};
//!
//! # async fn demo(adapter: impl vaultlink::VaultTransport + 'static) {
//! let session = Session::open(adapter, SessionConfig::default()).await.unwrap();
//! match ops::get_credentials(&session, "example.org").await {
//!     ops::CredentialLookup::Found(creds) => println!("{:?}", creds.login),
//!     other => eprintln!("lookup failed: {other:?}"),
//! }
//! session.close().await;
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod ops;
pub mod protocol;
pub mod session;
pub mod transport;

pub use codec::Credentials;
pub use error::{Result, VaultError};
pub use protocol::{Command, Frame, FrameCodec, Message};
pub use session::{CommOp, Session, SessionConfig};
pub use transport::{TransportEvent, VaultTransport};
