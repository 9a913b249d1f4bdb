//! In-memory kettle used by the unit tests.
use crate::protocol::{Register, REGISTER_LEN};
use crate::transport::{Connector, Link, NotifyFn, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

pub const BASE: [u8; REGISTER_LEN] = [
    0x00, 0x02, 0x5A, 0x80, 0xBE, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x1E, 0x0E, 0x01, 0x0F, 0x05,
    0x00, 0x03,
];

#[derive(Default)]
pub struct MockState {
    pub memory: Vec<u8>,
    pub connected: bool,
    pub connect_failures: u32,
    pub fail_subscribe: bool,
    pub fail_reads: bool,
    /// Index of the write that fails, counted over the writes already recorded.
    pub fail_write_at: Option<usize>,
    pub connects: u32,
    pub reads: u32,
    pub subscribes: u32,
    pub unsubscribes: u32,
    pub disconnects: u32,
    pub writes: Vec<(Instant, Register)>,
    pub on_notify: Option<NotifyFn>,
}

#[derive(Clone)]
pub struct MockKettle {
    pub state: Arc<Mutex<MockState>>,
}

impl MockKettle {
    pub fn new(memory: [u8; REGISTER_LEN]) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                memory: memory.to_vec(),
                ..Default::default()
            })),
        }
    }

    pub fn with(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock());
    }

    pub fn writes(&self) -> Vec<(Instant, Register)> {
        self.state.lock().writes.clone()
    }

    pub fn written(&self) -> Vec<Register> {
        self.writes().into_iter().map(|(_, r)| r).collect()
    }

    /// Pushes a notification through the subscribed callback.
    pub fn notify(&self, data: &[u8]) {
        let on_notify = self.state.lock().on_notify.clone();
        if let Some(on_notify) = on_notify {
            on_notify(data);
        }
    }

    /// Simulates the kettle dropping the link on its side.
    pub fn drop_link(&self) {
        self.state.lock().connected = false;
    }
}

pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MockLink")
    }
}

fn refused(what: &str) -> TransportError {
    TransportError::Backend(what.into())
}

#[async_trait]
impl Connector for MockKettle {
    type Device = ();
    type Link = MockLink;

    async fn connect(&self, _device: &()) -> Result<MockLink, TransportError> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(refused("connection refused"));
        }
        state.connected = true;
        Ok(MockLink {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl Link for MockLink {
    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read(&self) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.reads += 1;
        if state.fail_reads {
            return Err(refused("read failed"));
        }
        Ok(state.memory.clone())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        if state.fail_write_at == Some(state.writes.len()) {
            state.fail_write_at = None;
            return Err(refused("write failed"));
        }
        let register = Register::try_from(data).map_err(|e| refused(&e.to_string()))?;
        state.writes.push((Instant::now(), register));
        state.memory = data.to_vec();
        Ok(())
    }

    async fn subscribe(&self, on_notify: NotifyFn) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_subscribe {
            return Err(refused("subscribe failed"));
        }
        state.subscribes += 1;
        state.on_notify = Some(on_notify);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.unsubscribes += 1;
        state.on_notify = None;
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.disconnects += 1;
        state.connected = false;
        Ok(())
    }
}
