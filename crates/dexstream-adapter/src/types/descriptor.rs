/*
[INPUT]:  Network, method and stream ID triples
[OUTPUT]: Subscription descriptors and their derived map keys
[POS]:    Data layer - subscription identity
[UPDATE]: When the key format or composite ID convention changes
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use super::enums::{Method, Network};

/// Separator used when an ID combines an account and a symbol.
pub const COMPOSITE_ID_SEPARATOR: char = ':';

/// Identifies one logical data stream: (network, method, id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "Network")]
    pub network: Network,
    #[serde(rename = "Method")]
    pub method: Method,
    #[serde(rename = "ID")]
    pub id: String,
}

impl Descriptor {
    pub fn new(network: Network, method: Method, id: impl Into<String>) -> Self {
        Self {
            network,
            method,
            id: id.into(),
        }
    }

    /// ID for the account-and-symbol methods.
    pub fn composite_id(account: &str, symbol: &str) -> String {
        format!("{account}{COMPOSITE_ID_SEPARATOR}{symbol}")
    }

    /// Map key `"{network}-{method}-{id}"`.
    ///
    /// Network and method render as bare integers, so the first two dashes
    /// always delimit them and the ID is carried verbatim.
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey(format!("{}-{}-{}", self.network, self.method, self.id))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}/{}", self.network, self.method, self.id)
    }
}

/// Derived registry/store key for a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Descriptor> for SubscriptionKey {
    fn from(descriptor: &Descriptor) -> Self {
        descriptor.key()
    }
}
