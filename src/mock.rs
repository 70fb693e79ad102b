//! Scripted transport for channel, registry and client tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PcomError, Result};
use crate::transport::{Connector, Transport};

type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Something a mock transport did, tagged with its connection number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockEvent {
    Connect(usize),
    Send(usize, Vec<u8>),
    Receive(usize, Vec<u8>),
    Close(usize),
}

enum Script {
    Chunks(VecDeque<Vec<u8>>),
    Refuse,
}

#[derive(Default)]
struct Shared {
    scripts: VecDeque<Script>,
    responder: Option<Responder>,
    connect_delay: Option<Duration>,
    events: Vec<MockEvent>,
    attempts: usize,
    connects: usize,
}

/// Hands out [`MockTransport`]s in the order they were scripted.
///
/// Connections without a script accept sends and never answer, unless a
/// responder is installed.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Scripts the next connection to return `chunks`, one per receive.
    /// An empty chunk reads as a closed connection.
    pub(crate) fn push_responses(&self, chunks: Vec<Vec<u8>>) {
        self.shared
            .lock()
            .scripts
            .push_back(Script::Chunks(chunks.into()));
    }

    pub(crate) fn push_silent_connection(&self) {
        self.push_responses(Vec::new());
    }

    pub(crate) fn push_refused_connection(&self) {
        self.shared.lock().scripts.push_back(Script::Refuse);
    }

    /// Answers every request with the bytes `responder` returns for it.
    pub(crate) fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.shared.lock().responder = Some(Arc::new(responder));
    }

    /// Makes every connect take `delay` before it resolves.
    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.shared.lock().connect_delay = Some(delay);
    }

    pub(crate) fn set_echo(&self, echo: bool) {
        if echo {
            self.set_responder(|request| Some(request.to_vec()));
        } else {
            self.shared.lock().responder = None;
        }
    }

    pub(crate) fn events(&self) -> Vec<MockEvent> {
        self.shared.lock().events.clone()
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::Send(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Connect calls, refused ones included.
    pub(crate) fn attempts(&self) -> usize {
        self.shared.lock().attempts
    }

    /// Successful connects.
    pub(crate) fn connects(&self) -> usize {
        self.shared.lock().connects
    }
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("MockConnector")
            .field("scripts", &shared.scripts.len())
            .field("connects", &shared.connects)
            .finish()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<Box<dyn Transport>> {
        let delay = self.shared.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut shared = self.shared.lock();
        shared.attempts += 1;

        let chunks = match shared.scripts.pop_front() {
            Some(Script::Refuse) => return Err(PcomError::connection("connection refused")),
            Some(Script::Chunks(chunks)) => chunks,
            None => VecDeque::new(),
        };

        shared.connects += 1;
        let id = shared.connects;
        shared.events.push(MockEvent::Connect(id));

        Ok(Box::new(MockTransport {
            id,
            chunks,
            pending: VecDeque::new(),
            closed: false,
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub(crate) struct MockTransport {
    id: usize,
    chunks: VecDeque<Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    closed: bool,
    shared: Arc<Mutex<Shared>>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(PcomError::Disposed);
        }
        tokio::task::yield_now().await;

        let responder = {
            let mut shared = self.shared.lock();
            shared.events.push(MockEvent::Send(self.id, data.to_vec()));
            shared.responder.clone()
        };
        if let Some(response) = responder.and_then(|responder| responder(data)) {
            self.pending.push_back(response);
        }
        Ok(data.len())
    }

    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(PcomError::Disposed);
        }
        tokio::task::yield_now().await;

        let Some(mut chunk) = self.chunks.pop_front().or_else(|| self.pending.pop_front()) else {
            tokio::time::sleep(timeout).await;
            return Err(PcomError::timeout("mock receive timed out"));
        };

        if chunk.len() > buffer.len() {
            let rest = chunk.split_off(buffer.len());
            self.chunks.push_front(rest);
        }
        buffer[..chunk.len()].copy_from_slice(&chunk);
        self.shared
            .lock()
            .events
            .push(MockEvent::Receive(self.id, chunk.clone()));
        Ok(chunk.len())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.lock().events.push(MockEvent::Close(self.id));
        }
    }
}
