/*
[INPUT]:  Raw WebSocket text frames / outbound subscription intents
[OUTPUT]: Parsed Envelope structs and serialized subscribe/unsubscribe frames
[POS]:    WebSocket layer - wire envelope parsing and encoding
[UPDATE]: When adding new actions or changing the envelope format
*/

use serde::{Deserialize, Serialize};

use crate::error::{DexstreamError, Result};
use crate::types::{Action, Descriptor, Method, Network};

/// Subscription block of an envelope.
///
/// `Content` is only present on server pushes and holds a JSON document
/// encoded as a string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WireSubscription {
    #[serde(rename = "Network", default)]
    pub network: Network,
    #[serde(rename = "Method", default)]
    pub method: Method,
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Content", default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl WireSubscription {
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.network, self.method, self.id.clone())
    }
}

impl From<&Descriptor> for WireSubscription {
    fn from(descriptor: &Descriptor) -> Self {
        Self {
            network: descriptor.network,
            method: descriptor.method,
            id: descriptor.id.clone(),
            content: None,
        }
    }
}

/// Frame exchanged in both directions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    #[serde(rename = "Action")]
    pub action: Action,
    #[serde(rename = "Subscription", default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<WireSubscription>,
}

impl Envelope {
    pub fn subscribe(descriptor: &Descriptor) -> Self {
        Self {
            action: Action::Subscribe,
            subscription: Some(descriptor.into()),
        }
    }

    pub fn unsubscribe(descriptor: &Descriptor) -> Self {
        Self {
            action: Action::Unsubscribe,
            subscription: Some(descriptor.into()),
        }
    }

    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| DexstreamError::MalformedFrame(err.to_string()))
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Subscription payload of a server push, if this frame carries one.
    ///
    /// Any frame with a `Content` string counts; acks echoing a bare
    /// subscription do not.
    pub fn into_push(self) -> Option<WireSubscription> {
        self.subscription.filter(|sub| sub.content.is_some())
    }
}
