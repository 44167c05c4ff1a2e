//! Scripted in-memory transport standing in for a real BLE link.
//!
//! The mock plays the device side of the protocol: it acknowledges writes,
//! reassembles incoming frames, and answers each complete message with the
//! next scripted response, delivered as notification frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use vaultlink::error::{Result, VaultError};
use vaultlink::protocol::{Frame, FrameCodec, Message, FRAME_SIZE};
use vaultlink::transport::{TransportEvent, VaultTransport};

const EVENT_CAPACITY: usize = 256;

struct MockState {
    events: Option<mpsc::Sender<TransportEvent>>,
    writes: Vec<Vec<u8>>,
    pending: Vec<Frame>,
    responses: VecDeque<Message>,
    read_values: VecDeque<Vec<u8>>,
    codec: FrameCodec,
    has_comm_service: bool,
    descriptor_status: i32,
    mtu_status: i32,
    write_status: i32,
}

/// A scripted fake device. Clone it to keep a handle after the session
/// takes ownership.
#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                events: None,
                writes: Vec::new(),
                pending: Vec::new(),
                responses: VecDeque::new(),
                read_values: VecDeque::new(),
                codec: FrameCodec::new(),
                has_comm_service: true,
                descriptor_status: 0,
                mtu_status: 0,
                write_status: 0,
            })),
        }
    }

    pub fn without_comm_service(self) -> Self {
        self.inner.lock().unwrap().has_comm_service = false;
        self
    }

    pub fn with_descriptor_status(self, status: i32) -> Self {
        self.inner.lock().unwrap().descriptor_status = status;
        self
    }

    pub fn with_mtu_status(self, status: i32) -> Self {
        self.inner.lock().unwrap().mtu_status = status;
        self
    }

    pub fn with_write_status(self, status: i32) -> Self {
        self.inner.lock().unwrap().write_status = status;
        self
    }

    /// Queue the answer to the next complete incoming message.
    pub fn push_response(&self, msg: Message) {
        self.inner.lock().unwrap().responses.push_back(msg);
    }

    /// Queue the value of the next characteristic read (default: empty).
    pub fn push_read_value(&self, data: Vec<u8>) {
        self.inner.lock().unwrap().read_values.push_back(data);
    }

    /// Everything written to the write characteristic, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Unconsumed scripted responses.
    pub fn remaining_responses(&self) -> usize {
        self.inner.lock().unwrap().responses.len()
    }

    /// Push an unsolicited notification (e.g. a status frame).
    pub fn inject_notification(&self, data: Vec<u8>) {
        let tx = self.inner.lock().unwrap().events.clone();
        if let Some(tx) = tx {
            tx.try_send(TransportEvent::Notification { data }).unwrap();
        }
    }

    fn emit(state: &MockState, event: TransportEvent) {
        if let Some(tx) = &state.events {
            // Capacity is generous; a full channel is a test bug.
            tx.try_send(event).unwrap();
        }
    }
}

#[async_trait]
impl VaultTransport for MockDevice {
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let mut state = self.inner.lock().unwrap();
        state.events = Some(tx);
        MockDevice::emit(&state, TransportEvent::Connected);
        Ok(rx)
    }

    async fn discover_services(&self) -> Result<()> {
        let state = self.inner.lock().unwrap();
        MockDevice::emit(
            &state,
            TransportEvent::ServicesDiscovered {
                has_comm_service: state.has_comm_service,
            },
        );
        Ok(())
    }

    async fn subscribe_notifications(&self) -> Result<()> {
        let state = self.inner.lock().unwrap();
        MockDevice::emit(
            &state,
            TransportEvent::DescriptorWritten {
                status: state.descriptor_status,
            },
        );
        Ok(())
    }

    async fn request_mtu(&self, _mtu: u16) -> Result<()> {
        let state = self.inner.lock().unwrap();
        MockDevice::emit(
            &state,
            TransportEvent::MtuChanged {
                status: state.mtu_status,
            },
        );
        Ok(())
    }

    async fn write_characteristic(&self, data: &[u8]) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.writes.push(data.to_vec());
        let status = state.write_status;
        MockDevice::emit(&state, TransportEvent::WriteCompleted { status });
        if status != 0 || data.len() != FRAME_SIZE {
            // Rejected write or a raw packet (flip-bit reset): no device logic.
            return Ok(());
        }
        let frame = Frame::from_bytes(data).ok_or_else(|| {
            VaultError::Transport("mock received malformed frame".into())
        })?;
        state.pending.push(frame);
        let expected = state.pending[0].fragment_count() as usize;
        if state.pending.len() < expected {
            return Ok(());
        }
        let frames = std::mem::take(&mut state.pending);
        if FrameCodec::deserialize(&frames).is_some() {
            if let Some(response) = state.responses.pop_front() {
                for frame in state.codec.serialize(&response) {
                    MockDevice::emit(
                        &state,
                        TransportEvent::Notification {
                            data: frame.as_bytes().to_vec(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn read_characteristic(&self) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        let data = state.read_values.pop_front().unwrap_or_default();
        MockDevice::emit(&state, TransportEvent::ReadCompleted { status: 0, data });
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.inner.lock().unwrap();
        if let Some(tx) = state.events.take() {
            let _ = tx.try_send(TransportEvent::Disconnected);
        }
    }
}
