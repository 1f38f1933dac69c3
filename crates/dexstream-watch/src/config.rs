/*
[INPUT]:  YAML configuration file
[OUTPUT]: Validated stream watch configuration
[POS]:    Configuration layer - connection and subscription setup
[UPDATE]: When adding new configuration options
*/

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, bail};
use serde::{Deserialize, Deserializer, Serialize};

use dexstream_adapter::{Descriptor, ManagerConfig, Method, Network, ReconnectPolicy, UpdateStrategy};

/// Top-level configuration for the stream watcher
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    /// Stream endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Default network for subscriptions that do not name one
    #[serde(default, deserialize_with = "named")]
    pub network: Network,
    /// Reconnect policy after the transport drops
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Re-send subscribe frames for live keys after a reconnect
    #[serde(default)]
    pub resubscribe_on_reconnect: bool,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Base URL for out-of-band snapshot requests
    #[serde(default)]
    pub snapshot_base_url: Option<String>,
    /// Streams to watch
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Configuration for a single stream subscription
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// Stream method, by name (`ticker`) or wire integer (`5`)
    #[serde(deserialize_with = "named")]
    pub method: Method,
    /// Stream ID; a symbol, an account, or `account:symbol`
    pub id: String,
    /// Overrides the top-level network
    #[serde(default, deserialize_with = "named_opt")]
    pub network: Option<Network>,
    #[serde(default)]
    pub strategy: UpdateStrategy,
    /// Snapshot path template relative to `snapshot_base_url`
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl WatchConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read config file {path}"))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            bail!("url must start with ws:// or wss://, got '{}'", self.url);
        }
        if self.subscriptions.is_empty() {
            bail!("at least one subscription is required");
        }

        let mut seen = HashSet::new();
        let mut routes: HashMap<Method, &str> = HashMap::new();
        for (index, sub) in self.subscriptions.iter().enumerate() {
            if matches!(sub.method, Method::Unspecified | Method::Wallet) {
                bail!("subscriptions[{index}]: method '{}' cannot be subscribed", sub.method.name());
            }
            if sub.id.trim().is_empty() {
                bail!("subscriptions[{index}]: id must not be empty");
            }

            let descriptor = self.descriptor(sub);
            if !seen.insert(descriptor.key()) {
                bail!("subscriptions[{index}]: duplicate stream {descriptor}");
            }

            if let Some(path) = sub.snapshot_path.as_deref() {
                if self.snapshot_base_url.is_none() {
                    bail!("subscriptions[{index}]: snapshot_path requires snapshot_base_url");
                }
                // One route template per method; IDs are substituted per stream.
                if let Some(existing) = routes.insert(sub.method, path)
                    && existing != path
                {
                    bail!(
                        "subscriptions[{index}]: conflicting snapshot_path for method '{}'",
                        sub.method.name()
                    );
                }
            }
        }
        Ok(())
    }

    pub fn descriptor(&self, sub: &SubscriptionConfig) -> Descriptor {
        Descriptor::new(sub.network.unwrap_or(self.network), sub.method, sub.id.clone())
    }

    pub fn descriptors(&self) -> Vec<Descriptor> {
        self.subscriptions.iter().map(|sub| self.descriptor(sub)).collect()
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            reconnect: self.reconnect,
            resubscribe_on_reconnect: self.resubscribe_on_reconnect,
            connect_timeout_ms: self.connect_timeout_ms,
            ..ManagerConfig::default()
        }
    }

    /// (method, template) pairs for the snapshot client.
    pub fn snapshot_routes(&self) -> Vec<(Method, String)> {
        let mut routes: Vec<(Method, String)> = Vec::new();
        for sub in &self.subscriptions {
            if let Some(path) = &sub.snapshot_path
                && !routes.iter().any(|(method, _)| *method == sub.method)
            {
                routes.push((sub.method, path.clone()));
            }
        }
        routes
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrInt {
    Int(i64),
    Name(String),
}

impl NameOrInt {
    fn parse<T>(self) -> Result<T, String>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let text = match self {
            NameOrInt::Int(value) => value.to_string(),
            NameOrInt::Name(name) => name,
        };
        text.parse().map_err(|err: T::Err| err.to_string())
    }
}

fn named<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    NameOrInt::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

fn named_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    Option::<NameOrInt>::deserialize(deserializer)?
        .map(NameOrInt::parse)
        .transpose()
        .map_err(serde::de::Error::custom)
}
