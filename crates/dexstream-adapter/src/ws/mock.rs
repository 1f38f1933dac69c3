/*
[INPUT]:  Scripted server behavior from tests (open, push, drop)
[OUTPUT]: In-memory Connector/Transport pair with observable outbound frames
[POS]:    WebSocket layer - mock transport for tests and demos
[UPDATE]: When the Transport or Connector traits change
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use super::transport::{Connector, Transport};
use crate::error::{DexstreamError, Result};

#[derive(Debug)]
struct MockShared {
    auto_open: bool,
    open_permits: Semaphore,
    connects: AtomicUsize,
    sent_tx: mpsc::UnboundedSender<String>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

/// Mock connector for testing
///
/// Each `connect` call yields a transport wired to the paired [`MockPeer`].
/// Unless created with [`MockConnector::auto_open`], a connect attempt stays
/// pending until the peer calls [`MockPeer::open`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<MockShared>,
}

/// Server side of a [`MockConnector`].
#[derive(Debug)]
pub struct MockPeer {
    shared: Arc<MockShared>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl MockConnector {
    /// Connector whose connect attempts wait for [`MockPeer::open`].
    pub fn new() -> (Self, MockPeer) {
        Self::build(false)
    }

    /// Connector whose connect attempts open immediately.
    pub fn auto_open() -> (Self, MockPeer) {
        Self::build(true)
    }

    fn build(auto_open: bool) -> (Self, MockPeer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(MockShared {
            auto_open,
            open_permits: Semaphore::new(0),
            connects: AtomicUsize::new(0),
            sent_tx,
            inbound_tx: Mutex::new(None),
        });
        (
            Self {
                shared: shared.clone(),
            },
            MockPeer { shared, sent_rx },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        if !self.shared.auto_open {
            self.shared
                .open_permits
                .acquire()
                .await
                .map_err(|_| DexstreamError::WebSocket("mock peer gone".to_string()))?
                .forget();
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        *self
            .shared
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(inbound_tx);

        Ok(Box::new(MockTransport {
            inbound: inbound_rx,
            sent: self.shared.sent_tx.clone(),
        }))
    }
}

impl MockPeer {
    /// Let one pending (or the next) connect attempt complete.
    pub fn open(&self) {
        self.shared.open_permits.add_permits(1);
    }

    /// Number of connect attempts seen so far.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Deliver a text frame to the currently open transport.
    pub fn push(&self, text: impl Into<String>) -> bool {
        let guard = self
            .shared
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Close the current transport from the server side.
    pub fn drop_connection(&self) {
        self.shared
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Wait for the next frame written by the client.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }

    /// Frames written by the client and not yet observed.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent_rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sent
            .send(text)
            .map_err(|_| DexstreamError::WebSocket("mock peer gone".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.inbound.close();
        Ok(())
    }
}
