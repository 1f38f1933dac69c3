/*
[INPUT]:  WatchConfig + a stream connector (+ optional snapshot source)
[OUTPUT]: Latest-per-stream state via `watch` + logged connection transitions
[POS]:    Application layer - owns the connection manager for the process lifetime
[UPDATE]: When changing startup order, seeding, or shutdown semantics
*/

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dexstream_adapter::{
    ConnectionManager, ConnectionState, Connector, Descriptor, Method, Orderbook, PayloadCodec,
    SnapshotClient, SubscriptionKey, Ticker, TungsteniteConnector, decode_state,
};

use crate::config::WatchConfig;

/// Subscribes every configured stream on one shared connection and
/// republishes each stream's materialized state.
#[derive(Debug)]
pub struct StreamWatcher {
    config: WatchConfig,
    manager: ConnectionManager,
    snapshots: Option<SnapshotClient>,
    states: HashMap<SubscriptionKey, watch::Sender<Option<Value>>>,
}

impl StreamWatcher {
    pub fn new(config: WatchConfig) -> Result<Self> {
        Self::with_connector(config, TungsteniteConnector)
    }

    pub fn with_connector(config: WatchConfig, connector: impl Connector) -> Result<Self> {
        let manager =
            ConnectionManager::with_parts(connector, config.manager_config(), PayloadCodec::default());

        let snapshots = match &config.snapshot_base_url {
            Some(base_url) => {
                let client = config
                    .snapshot_routes()
                    .into_iter()
                    .fold(SnapshotClient::new(base_url)?, |client, (method, path)| {
                        client.route(method, path)
                    });
                Some(client)
            }
            None => None,
        };

        let states = config
            .descriptors()
            .iter()
            .map(|descriptor| (descriptor.key(), watch::channel(None).0))
            .collect();

        Ok(Self {
            config,
            manager,
            snapshots,
            states,
        })
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Latest state for a configured stream.
    pub fn subscribe_state(&self, descriptor: &Descriptor) -> Option<watch::Receiver<Option<Value>>> {
        self.states.get(&descriptor.key()).map(watch::Sender::subscribe)
    }

    /// Register handlers, seed snapshots, then open the transport.
    ///
    /// Subscriptions are registered before connecting so their subscribe
    /// frames go out in the open flush.
    pub async fn start(&self) -> Result<()> {
        for sub in &self.config.subscriptions {
            let descriptor = self.config.descriptor(sub);
            let tx = self
                .states
                .get(&descriptor.key())
                .cloned()
                .ok_or_else(|| anyhow!("no state channel for {descriptor}"))?;
            let key = descriptor.key();
            let method = descriptor.method;

            self.manager.subscribe(
                &descriptor,
                move |state| {
                    debug!(%key, summary = %summarize(method, state), "stream update");
                    tx.send_replace(Some(state.clone()));
                },
                sub.strategy,
            );
        }
        info!(count = self.config.subscriptions.len(), "subscriptions registered");

        if let Some(client) = &self.snapshots {
            // Routes are per method; only streams that asked for a snapshot get one.
            let seeded = self
                .config
                .subscriptions
                .iter()
                .filter(|sub| sub.snapshot_path.is_some())
                .map(|sub| self.config.descriptor(sub));
            for descriptor in seeded {
                match self.manager.seed_from(client, &descriptor).await {
                    Ok(true) => info!(key = %descriptor.key(), "snapshot seeded"),
                    Ok(false) => {}
                    Err(err) => warn!(key = %descriptor.key(), error = %err, "snapshot fetch failed"),
                }
            }
        }

        if !self.manager.connect(&self.config.url) {
            return Err(anyhow!("stream transport already started"));
        }
        Ok(())
    }

    /// Follow connection state until `shutdown` fires or the transport is
    /// gone for good.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut states = self.manager.connection_state();

        loop {
            let current = states.borrow_and_update().clone();
            match &current {
                ConnectionState::Connected => info!(url = %self.config.url, "stream connected"),
                ConnectionState::Reconnecting { attempt } => {
                    warn!(attempt, "stream disconnected; reconnecting")
                }
                ConnectionState::Disconnected => {
                    return Err(anyhow!("stream transport closed"));
                }
                ConnectionState::Idle | ConnectionState::Connecting => {
                    debug!(state = ?current, "stream connection state")
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                changed = states.changed() => {
                    changed.context("connection manager dropped")?;
                }
            }
        }
    }

    /// Close the transport and drop all subscriptions.
    pub fn shutdown(&self) {
        self.manager.close();
    }
}

/// One-line description of a state value for logs.
pub fn summarize(method: Method, state: &Value) -> String {
    match method {
        Method::Orderbook | Method::OrderbookForSymbolAndAccount => {
            match decode_state::<Orderbook>(state) {
                Ok(book) => format!(
                    "bids={} asks={} best_bid={} best_ask={} spread={}",
                    book.bids.len(),
                    book.asks.len(),
                    display_opt(book.best_bid().map(|level| level.price)),
                    display_opt(book.best_ask().map(|level| level.price)),
                    display_opt(book.spread()),
                ),
                Err(_) => describe(state),
            }
        }
        Method::Ticker => match decode_state::<Ticker>(state) {
            Ok(ticker) => format!(
                "symbol={} last={}",
                ticker.symbol,
                display_opt(ticker.last_price)
            ),
            Err(_) => describe(state),
        },
        _ => describe(state),
    }
}

fn describe(state: &Value) -> String {
    match state {
        Value::Array(items) => format!("items={}", items.len()),
        Value::Object(fields) => format!("fields={}", fields.len()),
        other => other.to_string(),
    }
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}
