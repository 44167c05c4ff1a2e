//! Device session: one logical connection to one vault.
//!
//! The session owns the transport handle and turns its asynchronous,
//! callback-delivered events into awaitable, timeout-bound operations. A
//! spawned pump task is the sole consumer of transport events; it publishes
//! each one as the current [`CommOp`] on a latest-value channel, and
//! caller-facing operations await the state they need.
//!
//! # Architecture
//!
//! ```text
//! caller ──► idle gate ──► write/read/notify waits ─┐
//!                                                   │ watch<CommOp>
//! transport events ──► pump task ───────────────────┘
//! ```
//!
//! Every externally visible operation first acquires the idle gate, so at
//! most one logical conversation is in flight per session; a second caller
//! queues on the gate. Every await carries an explicit timeout and resolves
//! to `None` on expiry or disconnect; nothing here panics on a dead link.

mod comm_op;

pub use comm_op::CommOp;

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::codec::parse_lock_status;
use crate::error::Result;
use crate::protocol::{Command, Frame, FrameCodec, Message};
use crate::transport::{TransportEvent, VaultTransport, STATUS_OK};

/// Timeout for connection setup and idle-gate acquisition.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for a characteristic read or an awaited notification.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for a characteristic write acknowledgement.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// How long the pump holds an inbound notification for a listener.
pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(2);

/// MTU requested during connection setup.
pub const DEFAULT_MTU: u16 = 128;

/// Attempts per [`Session::communicate`] exchange before giving up.
pub const COMM_RETRIES: usize = 5;

/// Poll interval of the notification rendezvous.
const RENDEZVOUS_POLL: Duration = Duration::from_millis(10);

const LOCK_UNKNOWN: u8 = 0;
const LOCK_UNLOCKED: u8 = 1;
const LOCK_LOCKED: u8 = 2;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection setup / idle-gate timeout.
    pub connect_timeout: Duration,
    /// Read and notification timeout.
    pub read_timeout: Duration,
    /// Write acknowledgement timeout.
    pub write_timeout: Duration,
    /// Notification listener rendezvous window.
    pub rendezvous_timeout: Duration,
    /// MTU to negotiate after subscribing to notifications.
    pub mtu: u16,
    /// Initial debug level (0 = quiet, 1 = events, 2 = hex dumps).
    pub debug: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            rendezvous_timeout: DEFAULT_RENDEZVOUS_TIMEOUT,
            mtu: DEFAULT_MTU,
            debug: 0,
        }
    }
}

/// Connection setup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Pending,
    Ready,
    Failed,
}

/// One logical connection to one vault device.
///
/// Created by [`Session::open`]; permanently disconnected after a transport
/// disconnect or an unrecoverable setup failure. Reconnection means
/// constructing a new session.
pub struct Session<T: VaultTransport> {
    transport: Arc<T>,
    config: SessionConfig,
    state: Arc<watch::Sender<CommOp>>,
    link_rx: watch::Receiver<LinkState>,
    gate: Mutex<FrameCodec>,
    listeners: Arc<AtomicUsize>,
    locked: Arc<AtomicU8>,
    debug: Arc<AtomicU8>,
    _pump: JoinHandle<()>,
}

impl<T: VaultTransport + 'static> Session<T> {
    /// Connect the transport and start the connection sequence.
    ///
    /// Returns as soon as the event stream is established; readiness is
    /// observed through [`Session::has_communication_service`] or the first
    /// gated operation.
    pub async fn open(transport: T, config: SessionConfig) -> Result<Self> {
        let transport = Arc::new(transport);
        let events = transport.connect().await?;

        let (state_tx, _) = watch::channel(CommOp::Disconnected);
        let state = Arc::new(state_tx);
        let (link_tx, link_rx) = watch::channel(LinkState::Pending);
        let listeners = Arc::new(AtomicUsize::new(0));
        let locked = Arc::new(AtomicU8::new(LOCK_UNKNOWN));
        let debug = Arc::new(AtomicU8::new(config.debug));

        let pump = Pump {
            transport: transport.clone(),
            state: state.clone(),
            link: link_tx,
            listeners: listeners.clone(),
            locked: locked.clone(),
            debug: debug.clone(),
            mtu: config.mtu,
            rendezvous_timeout: config.rendezvous_timeout,
        };
        let pump = tokio::spawn(pump.run(events));

        Ok(Self {
            transport,
            config,
            state,
            link_rx,
            gate: Mutex::new(FrameCodec::new()),
            listeners,
            locked,
            debug,
            _pump: pump,
        })
    }

    /// Write a frame sequence, awaiting each acknowledgement.
    ///
    /// Returns the first non-zero write status, `Some(0)` when every frame
    /// was acknowledged, or `None` on timeout/disconnect.
    pub async fn send(&self, frames: &[Frame]) -> Option<i32> {
        let _gate = self.acquire_gate().await?;
        self.send_frames_locked(frames).await
    }

    /// Serialize and write one message without awaiting an answer.
    ///
    /// Advances the flip bit like any other send; use
    /// [`Session::communicate`] when the device is expected to answer.
    pub async fn send_message(&self, msg: &Message) -> Option<i32> {
        let mut gate = self.acquire_gate().await?;
        let frames = gate.codec.serialize(msg);
        self.send_frames_locked(&frames).await
    }

    /// Write one raw packet (e.g. the flip-bit reset) outside framing.
    pub async fn send_raw(&self, data: &[u8]) -> Option<i32> {
        let _gate = self.acquire_gate().await?;
        self.write_locked(data).await
    }

    /// Read the current characteristic value once.
    ///
    /// This is the idempotent "flush pending notification" probe; message
    /// reception goes through notifications instead.
    pub async fn read_raw(&self) -> Option<Vec<u8>> {
        let _gate = self.acquire_gate().await?;
        self.read_raw_locked().await
    }

    /// Drain stale notification state left by a prior aborted exchange.
    ///
    /// Reads until two consecutive reads return identical content.
    pub async fn flush_pending_reads(&self) -> Option<Vec<u8>> {
        let _gate = self.acquire_gate().await?;
        self.flush_locked().await
    }

    /// Await one full notification-delivered frame sequence.
    pub async fn read_message(&self) -> Option<Vec<Frame>> {
        let _gate = self.acquire_gate().await?;
        self.read_message_locked().await
    }

    /// One full exchange: flush, send, await and decode the response.
    ///
    /// A `PleaseRetry` response repeats the whole exchange, re-serializing
    /// the message so the flip bit advances exactly once per attempt, up to
    /// [`COMM_RETRIES`] attempts.
    pub async fn communicate(&self, msg: &Message) -> Option<Message> {
        let mut gate = self.acquire_gate().await?;
        for attempt in 1..=COMM_RETRIES {
            self.flush_locked().await?;
            let frames = gate.codec.serialize(msg);
            self.send_frames_locked(&frames).await?;
            let frames = self.read_message_locked().await?;
            let response = FrameCodec::deserialize(&frames)?;
            if response.command() == Command::PleaseRetry {
                tracing::debug!(attempt, "device busy, repeating exchange");
                continue;
            }
            return Some(response);
        }
        tracing::warn!(retries = COMM_RETRIES, "device kept asking to retry, giving up");
        None
    }

    /// Last lock state reported by the device, if any status push has been
    /// seen. Updated opportunistically, not linearized with operations.
    pub fn is_locked(&self) -> Option<bool> {
        match self.locked.load(Ordering::Acquire) {
            LOCK_UNLOCKED => Some(false),
            LOCK_LOCKED => Some(true),
            _ => None,
        }
    }

    /// Whether connection setup found the vault communication service.
    ///
    /// Waits (bounded) for the setup outcome; `false` after a setup failure
    /// or disconnect.
    pub async fn has_communication_service(&self) -> bool {
        self.wait_ready().await && !matches!(*self.state.borrow(), CommOp::Disconnected)
    }

    /// Adjust the debug level (0 = quiet, 1 = events, 2 = hex dumps).
    pub fn set_debug(&self, level: u8) {
        self.debug.store(level, Ordering::Release);
    }

    /// Tear the connection down. The session is unusable afterwards.
    pub async fn close(&self) {
        self.transport.disconnect().await;
    }

    /// Await the connection setup outcome.
    async fn wait_ready(&self) -> bool {
        let mut rx = self.link_rx.clone();
        let result = match timeout(
            self.config.connect_timeout,
            rx.wait_for(|l| *l != LinkState::Pending),
        )
        .await
        {
            Ok(Ok(link)) => *link == LinkState::Ready,
            _ => false,
        };
        result
    }

    /// Acquire the idle gate: wait for `Idle`, then mark the session busy.
    ///
    /// The returned guard restores `Idle` when dropped, releasing queued
    /// callers.
    async fn acquire_gate(&self) -> Option<Gate<'_, T>> {
        if !self.wait_ready().await {
            return None;
        }
        let codec = timeout(self.config.connect_timeout, self.gate.lock())
            .await
            .ok()?;
        self.await_op(self.config.connect_timeout, |op| {
            matches!(op, CommOp::Idle)
        })
        .await?;
        self.state.send_replace(CommOp::OperationPending);
        Some(Gate {
            session: self,
            codec,
        })
    }

    /// Wait for a state matching `pred`, aborting early on disconnect.
    async fn await_op<F>(&self, dur: Duration, pred: F) -> Option<CommOp>
    where
        F: Fn(&CommOp) -> bool,
    {
        let mut rx = self.state.subscribe();
        let result = match timeout(
            dur,
            rx.wait_for(|op| pred(op) || matches!(op, CommOp::Disconnected)),
        )
        .await
        {
            Ok(Ok(op)) => {
                let op = (*op).clone();
                if matches!(op, CommOp::Disconnected) {
                    None
                } else {
                    Some(op)
                }
            }
            _ => None,
        };
        result
    }

    /// Issue one characteristic write and await its acknowledgement.
    async fn write_locked(&self, data: &[u8]) -> Option<i32> {
        if self.debug.load(Ordering::Acquire) >= 2 {
            tracing::debug!(data = %hex(data), "write characteristic");
        }
        self.state.send_replace(CommOp::WriteRequested);
        if let Err(e) = self.transport.write_characteristic(data).await {
            tracing::warn!(error = %e, "write request failed");
            return None;
        }
        match self
            .await_op(self.config.write_timeout, |op| {
                matches!(op, CommOp::Write { .. })
            })
            .await?
        {
            CommOp::Write { status } => Some(status),
            _ => None,
        }
    }

    /// Write each frame in order, stopping at the first failure.
    async fn send_frames_locked(&self, frames: &[Frame]) -> Option<i32> {
        let mut last = None;
        for frame in frames {
            let status = self.write_locked(frame.as_bytes()).await?;
            if status != STATUS_OK {
                tracing::warn!(status, index = frame.fragment_index(), "frame write rejected");
                return Some(status);
            }
            last = Some(status);
        }
        last
    }

    /// Issue one characteristic read and await its value.
    async fn read_raw_locked(&self) -> Option<Vec<u8>> {
        self.state.send_replace(CommOp::ReadRequested);
        if let Err(e) = self.transport.read_characteristic().await {
            tracing::warn!(error = %e, "read request failed");
            return None;
        }
        match self
            .await_op(self.config.read_timeout, |op| {
                matches!(op, CommOp::Read { .. })
            })
            .await?
        {
            CommOp::Read { data, .. } => {
                if self.debug.load(Ordering::Acquire) >= 2 {
                    tracing::debug!(data = %hex(&data), "read characteristic");
                }
                Some(data)
            }
            _ => None,
        }
    }

    /// Read until two consecutive reads agree (both may be empty).
    async fn flush_locked(&self) -> Option<Vec<u8>> {
        let mut prev: Option<Vec<u8>> = None;
        let mut cur = self.read_raw_locked().await;
        while cur != prev {
            prev = cur;
            cur = self.read_raw_locked().await;
        }
        cur
    }

    /// Await one notification frame and consume it from the stream.
    async fn read_notified_locked(&self) -> Option<Vec<u8>> {
        struct Listener<'a>(&'a AtomicUsize);
        impl Drop for Listener<'_> {
            fn drop(&mut self) {
                self.0.fetch_sub(1, Ordering::AcqRel);
            }
        }
        self.listeners.fetch_add(1, Ordering::AcqRel);
        let _listener = Listener(&self.listeners);

        let op = self
            .await_op(self.config.read_timeout, |op| {
                matches!(op, CommOp::ChangedChar { .. })
            })
            .await?;
        let CommOp::ChangedChar { data } = op else {
            return None;
        };
        // Consume the value so the next wait needs a fresh notification,
        // without clobbering one the pump published in the meantime.
        self.state.send_if_modified(|cur| {
            let same = matches!(&*cur, CommOp::ChangedChar { data: d } if *d == data);
            if same {
                *cur = CommOp::OperationPending;
            }
            same
        });
        Some(data)
    }

    /// Collect one notification-delivered frame sequence.
    ///
    /// Fragment 0 announces the count; every following notification must
    /// differ from its predecessor (duplicate retransmission guard) and
    /// carry the expected index and count.
    async fn read_message_locked(&self) -> Option<Vec<Frame>> {
        let first = self.read_notified_locked().await?;
        let frame = Frame::from_bytes(&first)?;
        if frame.fragment_index() != 0 {
            tracing::warn!(index = frame.fragment_index(), "first fragment has nonzero index");
            return None;
        }
        let count = frame.fragment_count();
        let mut frames = vec![frame];
        let mut prev = first;
        for expected in 1..count {
            let data = self.read_notified_locked().await?;
            if data == prev {
                tracing::warn!("duplicate notification instead of next fragment");
                return None;
            }
            let frame = Frame::from_bytes(&data)?;
            if frame.fragment_index() != expected || frame.fragment_count() != count {
                tracing::warn!(
                    index = frame.fragment_index(),
                    expected,
                    "unexpected fragment sequence"
                );
                return None;
            }
            frames.push(frame);
            prev = data;
        }
        Some(frames)
    }
}

/// Scoped idle-gate hold; restores `Idle` on drop.
struct Gate<'a, T: VaultTransport> {
    session: &'a Session<T>,
    codec: MutexGuard<'a, FrameCodec>,
}

impl<T: VaultTransport> Drop for Gate<'_, T> {
    fn drop(&mut self) {
        self.session.state.send_if_modified(|op| {
            if matches!(op, CommOp::Disconnected) {
                false
            } else {
                *op = CommOp::Idle;
                true
            }
        });
    }
}

/// Sole consumer of transport events; drives connection setup and publishes
/// every event as the current [`CommOp`].
struct Pump<T: VaultTransport> {
    transport: Arc<T>,
    state: Arc<watch::Sender<CommOp>>,
    link: watch::Sender<LinkState>,
    listeners: Arc<AtomicUsize>,
    locked: Arc<AtomicU8>,
    debug: Arc<AtomicU8>,
    mtu: u16,
    rendezvous_timeout: Duration,
}

impl<T: VaultTransport> Pump<T> {
    async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            if self.debug.load(Ordering::Acquire) >= 1 {
                tracing::debug!(?event, "transport event");
            }
            match event {
                TransportEvent::Connected => {
                    if let Err(e) = self.transport.discover_services().await {
                        self.fail(&format!("service discovery: {e}")).await;
                        break;
                    }
                }
                TransportEvent::ServicesDiscovered { has_comm_service } => {
                    if !has_comm_service {
                        self.fail("communication service missing").await;
                        break;
                    }
                    if let Err(e) = self.transport.subscribe_notifications().await {
                        self.fail(&format!("notification subscribe: {e}")).await;
                        break;
                    }
                }
                TransportEvent::DescriptorWritten { status } => {
                    if status != STATUS_OK {
                        self.fail(&format!("notification enable status {status}")).await;
                        break;
                    }
                    if let Err(e) = self.transport.request_mtu(self.mtu).await {
                        self.fail(&format!("mtu request: {e}")).await;
                        break;
                    }
                    self.state.send_replace(CommOp::ChangeMtu);
                }
                TransportEvent::MtuChanged { status } => {
                    if status != STATUS_OK {
                        self.fail(&format!("mtu negotiation status {status}")).await;
                        break;
                    }
                    let _ = self.link.send(LinkState::Ready);
                    self.state.send_replace(CommOp::Idle);
                    tracing::debug!("session ready");
                }
                TransportEvent::WriteCompleted { status } => {
                    self.state.send_replace(CommOp::Write { status });
                }
                TransportEvent::ReadCompleted { status, data } => {
                    self.state.send_replace(CommOp::Read { status, data });
                }
                TransportEvent::Notification { data } => {
                    self.deliver_notification(data).await;
                }
                TransportEvent::Disconnected => break,
            }
        }
        self.state.send_replace(CommOp::Disconnected);
        self.link.send_if_modified(|link| {
            if *link == LinkState::Pending {
                *link = LinkState::Failed;
                true
            } else {
                false
            }
        });
        tracing::debug!("session event stream closed");
    }

    /// Hand a notification to a waiting listener, or drop it.
    ///
    /// The lock flag updates from any status-bearing push regardless of
    /// whether anyone is listening.
    async fn deliver_notification(&self, data: Vec<u8>) {
        if let Some(locked) = parse_lock_status(&data) {
            self.locked.store(
                if locked { LOCK_LOCKED } else { LOCK_UNLOCKED },
                Ordering::Release,
            );
        }
        let deadline = Instant::now() + self.rendezvous_timeout;
        loop {
            if self.listeners.load(Ordering::Acquire) > 0 {
                self.state.send_replace(CommOp::ChangedChar { data });
                return;
            }
            if Instant::now() >= deadline {
                tracing::debug!("no listener for notification, dropping");
                return;
            }
            tokio::time::sleep(RENDEZVOUS_POLL).await;
        }
    }

    /// Terminal setup failure: log and close the channel.
    async fn fail(&self, reason: &str) {
        tracing::error!(reason, "connection setup failed, closing");
        self.transport.disconnect().await;
    }
}

/// Lowercase hex dump for debug-level frame logging.
fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.read_timeout, Duration::from_secs(20));
        assert_eq!(config.write_timeout, Duration::from_secs(20));
        assert_eq!(config.rendezvous_timeout, Duration::from_secs(2));
        assert_eq!(config.mtu, 128);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00ab10");
        assert_eq!(hex(&[]), "");
    }
}
