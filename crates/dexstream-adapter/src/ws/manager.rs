/*
[INPUT]:  connect/subscribe/unsubscribe/seed calls + inbound transport frames
[OUTPUT]: Materialized per-subscription state fanned out to handlers
[POS]:    WebSocket layer - connection manager (single multiplexed transport)
[UPDATE]: When changing connection lifecycle, pending-intent flush, or dispatch
*/

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::codec::PayloadCodec;
use super::message::Envelope;
use super::reconnect::ReconnectPolicy;
use super::registry::{Handler, HandlerId, Removal, SubscriptionRegistry};
use super::store::StateStore;
use super::strategy::UpdateStrategy;
use super::transport::{Connector, Transport, TungsteniteConnector};
use crate::error::{DexstreamError, Result};
use crate::types::{Action, Descriptor, SubscriptionKey, decode_state};

const DEFAULT_HANDSHAKE_SENTINEL: &str = "connected";
const MESSAGE_SAMPLE_LIMIT: usize = 3;
const SUBSCRIPTION_LOG_LIMIT: usize = 10;
const RAW_LOG_MAX_BYTES: usize = 1024;

static MESSAGE_SAMPLE_COUNT: AtomicUsize = AtomicUsize::new(0);
static SUBSCRIBE_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Manager tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Non-JSON greeting the server sends once after connect; ignored.
    pub handshake_sentinel: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Re-send subscribe frames for every registered key after a reconnect.
    /// Off by default: only pending intents are flushed on open.
    pub resubscribe_on_reconnect: bool,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            handshake_sentinel: Some(DEFAULT_HANDSHAKE_SENTINEL.to_string()),
            reconnect: ReconnectPolicy::None,
            resubscribe_on_reconnect: false,
            connect_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

#[derive(Debug)]
struct TransportSlot {
    generation: u64,
    url: String,
    outbound: Option<mpsc::UnboundedSender<String>>,
    shutdown: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct ManagerState {
    connected: bool,
    generation: u64,
    transport: Option<TransportSlot>,
    registry: SubscriptionRegistry,
    store: StateStore,
    pending_subscribe: Vec<Descriptor>,
    pending_unsubscribe: Vec<Descriptor>,
}

impl ManagerState {
    fn is_current(&self, generation: u64) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
    }

    /// Write a frame if the transport is open; no-op otherwise.
    fn send(&self, envelope: &Envelope) {
        if !self.connected {
            return;
        }
        let Some(outbound) = self.transport.as_ref().and_then(|slot| slot.outbound.as_ref())
        else {
            return;
        };

        match envelope.to_text() {
            Ok(text) => {
                if outbound.send(text).is_ok() {
                    log_subscription_sent(envelope);
                }
            }
            Err(err) => warn!(error = %err, "failed to encode outbound frame"),
        }
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    codec: PayloadCodec,
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    opened: watch::Sender<bool>,
    connection_state: watch::Sender<ConnectionState>,
}

/// Multiplexes every stream subscription over one transport.
///
/// Cheap to clone; all clones share the same connection, registry and
/// state store. Build one per application and pass it to consumers.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("connected", &state.connected)
            .field("subscriptions", &state.registry.len())
            .field("pending_subscribe", &state.pending_subscribe.len())
            .field("pending_unsubscribe", &state.pending_unsubscribe.len())
            .finish()
    }
}

impl ConnectionManager {
    /// Manager using the tokio-tungstenite transport and default settings.
    pub fn new() -> Self {
        Self::with_connector(TungsteniteConnector)
    }

    pub fn with_connector(connector: impl Connector) -> Self {
        Self::with_parts(connector, ManagerConfig::default(), PayloadCodec::default())
    }

    pub fn with_parts(connector: impl Connector, config: ManagerConfig, codec: PayloadCodec) -> Self {
        let (opened, _) = watch::channel(false);
        let (connection_state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                codec,
                config,
                state: Mutex::new(ManagerState::default()),
                opened,
                connection_state,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Open the transport to `url` unless one already exists.
    ///
    /// Returns `false` when the call was a no-op.
    pub fn connect(&self, url: &str) -> bool {
        let mut state = self.inner.lock();
        if let Some(slot) = &state.transport {
            debug!(url, current = %slot.url, "connect ignored; transport already present");
            return false;
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!(url, "connect called outside a Tokio runtime; transport not started");
            return false;
        }

        state.generation += 1;
        let generation = state.generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        state.transport = Some(TransportSlot {
            generation,
            url: url.to_string(),
            outbound: None,
            shutdown: Some(shutdown_tx),
        });
        drop(state);

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);
        info!(url, generation, "opening stream transport");

        let inner = self.inner.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            run_transport(inner, url, generation, shutdown_rx).await;
        });
        true
    }

    /// Register `handler` for `descriptor`.
    ///
    /// The first registration for a key binds `strategy`; later ones keep the
    /// bound strategy. A subscribe frame is sent now if connected, otherwise
    /// queued until the transport opens.
    pub fn subscribe<F>(&self, descriptor: &Descriptor, handler: F, strategy: UpdateStrategy) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        let (id, created) = state
            .registry
            .register(descriptor, Arc::new(handler), strategy);
        if created {
            debug!(key = %descriptor.key(), ?strategy, "subscription entry created");
        }

        if state.connected {
            state.send(&Envelope::subscribe(descriptor));
        } else {
            state.pending_subscribe.push(descriptor.clone());
        }
        id
    }

    /// Like [`subscribe`](Self::subscribe) but hands the handler a typed view
    /// of the state. Values that do not fit `T` are logged and skipped.
    pub fn subscribe_typed<T, F>(
        &self,
        descriptor: &Descriptor,
        handler: F,
        strategy: UpdateStrategy,
    ) -> HandlerId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let key = descriptor.key();
        self.subscribe(
            descriptor,
            move |value| match decode_state::<T>(value) {
                Ok(typed) => handler(typed),
                Err(err) => warn!(%key, error = %err, "state does not match handler type"),
            },
            strategy,
        )
    }

    /// Remove one handler. Returns `false` if it was not registered.
    ///
    /// Removing the last handler for a key drops the entry and its state and
    /// sends (or queues) an unsubscribe frame.
    pub fn unsubscribe(&self, descriptor: &Descriptor, handler: HandlerId) -> bool {
        let key = descriptor.key();
        let mut state = self.inner.lock();
        match state.registry.remove(&key, handler) {
            Removal::NotFound => false,
            Removal::HandlerRemoved { remaining } => {
                debug!(%key, handler = handler.as_u64(), remaining, "handler removed");
                true
            }
            Removal::EntryRemoved(_) => {
                if state.connected {
                    state.send(&Envelope::unsubscribe(descriptor));
                } else {
                    state.pending_unsubscribe.push(descriptor.clone());
                }
                state.store.remove(&key);
                debug!(%key, "subscription entry removed");
                true
            }
        }
    }

    /// Seed the state for `descriptor`, bypassing the update strategy.
    pub fn set_initial_state(&self, descriptor: &Descriptor, value: Value) {
        self.inner.lock().store.set(descriptor.key(), value);
    }

    /// Resolves once the transport has opened for the first time.
    pub fn connected(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut opened = self.inner.opened.subscribe();
        async move {
            let _ = opened.wait_for(|opened| *opened).await;
        }
    }

    /// Close the transport and forget every subscription, state and intent.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if let Some(mut slot) = state.transport.take()
            && let Some(shutdown) = slot.shutdown.take()
        {
            let _ = shutdown.send(());
        }
        state.connected = false;
        state.registry.clear();
        state.store.clear();
        state.pending_subscribe.clear();
        state.pending_unsubscribe.clear();
        drop(state);

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        info!("stream manager closed");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Last materialized value for `descriptor`.
    pub fn state(&self, descriptor: &Descriptor) -> Option<Value> {
        self.inner.lock().store.get(&descriptor.key()).cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    pub fn handler_count(&self, descriptor: &Descriptor) -> usize {
        self.inner
            .lock()
            .registry
            .get(&descriptor.key())
            .map_or(0, |entry| entry.handler_count())
    }

    /// Pending (subscribe, unsubscribe) intent counts.
    pub fn pending_intents(&self) -> (usize, usize) {
        let state = self.inner.lock();
        (state.pending_subscribe.len(), state.pending_unsubscribe.len())
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    #[cfg(test)]
    fn open_for_test(&self) -> mpsc::UnboundedReceiver<String> {
        let mut state = self.inner.lock();
        state.generation += 1;
        let generation = state.generation;
        state.transport = Some(TransportSlot {
            generation,
            url: "ws://test".to_string(),
            outbound: None,
            shutdown: None,
        });
        drop(state);

        let (tx, rx) = mpsc::unbounded_channel();
        assert!(self.inner.handle_open(generation, tx));
        rx
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transport open: flush pending intents. Returns `false` for a stale transport.
    fn handle_open(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let reopened = *self.opened.borrow();
        let mut state = self.lock();
        if !state.is_current(generation) {
            return false;
        }
        if let Some(slot) = state.transport.as_mut() {
            slot.outbound = Some(outbound);
        }
        state.connected = true;

        let pending_subscribe = std::mem::take(&mut state.pending_subscribe);
        let pending_unsubscribe = std::mem::take(&mut state.pending_unsubscribe);

        let mut resubscribe = Vec::new();
        if reopened && self.config.resubscribe_on_reconnect {
            let queued: Vec<SubscriptionKey> = pending_subscribe.iter().map(Descriptor::key).collect();
            resubscribe.extend(
                state
                    .registry
                    .descriptors()
                    .filter(|descriptor| !queued.contains(&descriptor.key()))
                    .cloned(),
            );
        }

        for descriptor in pending_subscribe.iter().chain(resubscribe.iter()) {
            state.send(&Envelope::subscribe(descriptor));
        }
        for descriptor in &pending_unsubscribe {
            state.send(&Envelope::unsubscribe(descriptor));
        }
        drop(state);

        info!(
            generation,
            flushed_subscribe = pending_subscribe.len(),
            flushed_unsubscribe = pending_unsubscribe.len(),
            resubscribed = resubscribe.len(),
            "stream transport open"
        );
        self.opened.send_replace(true);
        self.connection_state
            .send_replace(ConnectionState::Connected);
        true
    }

    /// Route one inbound text frame. Never fails; problems are logged.
    fn handle_text(&self, text: &str) {
        if self
            .config
            .handshake_sentinel
            .as_deref()
            .is_some_and(|sentinel| sentinel == text.trim())
        {
            debug!("handshake sentinel ignored");
            return;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    error = %err,
                    bytes = text.len(),
                    message = %truncate_for_log(text, RAW_LOG_MAX_BYTES),
                    "ws frame parse failed"
                );
                return;
            }
        };

        let action = envelope.action;
        let Some(push) = envelope.into_push() else {
            debug!(?action, "ws frame without subscription content discarded");
            return;
        };
        let descriptor = push.descriptor();
        let Some(content) = push.content else {
            return;
        };

        match self.apply_push(&descriptor, &content) {
            Ok(Some((handlers, next))) => {
                log_message_sample_once(&descriptor, handlers.len());
                for handler in handlers {
                    handler(&next);
                }
            }
            Ok(None) => {
                debug!(key = %descriptor.key(), "push for unregistered key discarded");
            }
            Err(err) => {
                warn!(
                    key = %descriptor.key(),
                    error = %err,
                    content = %truncate_for_log(&content, RAW_LOG_MAX_BYTES),
                    "ws push content rejected"
                );
            }
        }
    }

    /// Merge a push into the store. `Ok(None)` when nobody is subscribed.
    fn apply_push(
        &self,
        descriptor: &Descriptor,
        content: &str,
    ) -> Result<Option<(Vec<Handler>, Value)>> {
        let key = descriptor.key();
        let mut state = self.lock();
        let Some(entry) = state.registry.get(&key) else {
            return Ok(None);
        };
        let strategy = entry.strategy();
        let handlers = entry.handlers();

        let incoming = self.codec.decode(descriptor.method, content)?;
        let next = strategy.apply(state.store.get(&key), incoming);
        state.store.set(key, next.clone());
        Ok(Some((handlers, next)))
    }

    /// Transport stopped reading. Stops routing frames to it and requeues
    /// every frame it never wrote (`unsent` first) as a pending intent.
    fn handle_drop(
        &self,
        generation: u64,
        outbound: &mut mpsc::UnboundedReceiver<String>,
        unsent: Option<String>,
    ) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        state.connected = false;
        if let Some(slot) = state.transport.as_mut() {
            slot.outbound = None;
        }
        outbound.close();

        let mut requeued = 0usize;
        let queued = std::iter::from_fn(|| outbound.try_recv().ok());
        for frame in unsent.into_iter().chain(queued) {
            let Ok(envelope) = Envelope::parse(&frame) else {
                continue;
            };
            let Some(descriptor) = envelope.subscription.as_ref().map(|sub| sub.descriptor()) else {
                continue;
            };
            match envelope.action {
                Action::Subscribe => state.pending_subscribe.push(descriptor),
                Action::Unsubscribe => state.pending_unsubscribe.push(descriptor),
                Action::Close | Action::Response => continue,
            }
            requeued += 1;
        }
        drop(state);

        if requeued > 0 {
            debug!(generation, requeued, "unsent frames requeued as pending intents");
        }
    }

    /// Transport gone. Keeps the slot only while a reconnect is scheduled.
    fn handle_close(&self, generation: u64, retry_attempt: Option<u32>) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        state.connected = false;
        match retry_attempt {
            Some(_) => {
                if let Some(slot) = state.transport.as_mut() {
                    slot.outbound = None;
                }
            }
            None => state.transport = None,
        }
        drop(state);

        let next = match retry_attempt {
            Some(attempt) => ConnectionState::Reconnecting { attempt },
            None => ConnectionState::Disconnected,
        };
        self.connection_state.send_replace(next);
    }

    async fn open_transport(&self, url: &str) -> Result<Box<dyn Transport>> {
        match self.config.connect_timeout_ms {
            Some(ms) => {
                let duration = Duration::from_millis(ms);
                tokio::time::timeout(duration, self.connector.connect(url))
                    .await
                    .map_err(|_| DexstreamError::Timeout { duration })?
            }
            None => self.connector.connect(url).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamExit {
    /// Carries the frame whose write failed, if any.
    Dropped(Option<String>),
    Shutdown,
}

/// Drives one transport (and its reconnects) until shutdown or give-up.
async fn run_transport(
    inner: Arc<Inner>,
    url: String,
    generation: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;

    loop {
        let opened = tokio::select! {
            _ = &mut shutdown => return,
            opened = inner.open_transport(&url) => opened,
        };

        match opened {
            Ok(mut transport) => {
                attempt = 0;
                let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
                if !inner.handle_open(generation, outbound_tx) {
                    let _ = transport.close().await;
                    return;
                }

                match stream_loop(&inner, transport.as_mut(), &mut outbound_rx, &mut shutdown).await {
                    StreamExit::Shutdown => {
                        let _ = transport.close().await;
                        debug!(generation, "stream transport shut down");
                        return;
                    }
                    StreamExit::Dropped(unsent) => {
                        inner.handle_drop(generation, &mut outbound_rx, unsent);
                    }
                }
                warn!(%url, generation, "stream transport closed");
            }
            Err(err) => {
                warn!(%url, generation, error = %err, "stream transport connect failed");
            }
        }

        let next_attempt = attempt.saturating_add(1);
        let Some(delay) = inner.config.reconnect.delay_for(next_attempt) else {
            inner.handle_close(generation, None);
            return;
        };
        attempt = next_attempt;
        inner.handle_close(generation, Some(attempt));
        warn!(attempt, ?delay, "stream transport reconnect scheduled");

        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn stream_loop(
    inner: &Inner,
    transport: &mut dyn Transport,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut oneshot::Receiver<()>,
) -> StreamExit {
    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => return StreamExit::Shutdown,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return StreamExit::Dropped(None);
                };
                if let Err(err) = transport.send(frame.clone()).await {
                    warn!(error = %err, "ws send failed");
                    return StreamExit::Dropped(Some(frame));
                }
            }
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => inner.handle_text(&text),
                    Some(Err(err)) if err.is_frame_error() => {
                        warn!(error = %err, "ws frame dropped");
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "ws receive failed");
                        return StreamExit::Dropped(None);
                    }
                    None => return StreamExit::Dropped(None),
                }
            }
        }
    }
}

fn log_subscription_sent(envelope: &Envelope) {
    let count = SUBSCRIBE_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= SUBSCRIPTION_LOG_LIMIT {
        return;
    }

    if let Some(sub) = &envelope.subscription {
        info!(
            sample_index = count + 1,
            sample_limit = SUBSCRIPTION_LOG_LIMIT,
            action = ?envelope.action,
            network = ?sub.network,
            method = ?sub.method,
            id = %sub.id,
            "ws subscription sent"
        );
    }
}

fn log_message_sample_once(descriptor: &Descriptor, handlers: usize) {
    let count = MESSAGE_SAMPLE_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < MESSAGE_SAMPLE_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = MESSAGE_SAMPLE_LIMIT,
            key = %descriptor.key(),
            handlers,
            "ws message sample"
        );
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut cut = max_len;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + 3);
    out.push_str(&value[..cut]);
    out.push_str("...");
    out
}
