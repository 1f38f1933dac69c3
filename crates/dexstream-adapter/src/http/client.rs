/*
[INPUT]:  HTTP configuration (base URL, timeouts, per-method routes)
[OUTPUT]: Configured reqwest client returning JSON snapshot documents
[POS]:    HTTP layer - snapshot client core
[UPDATE]: When adding connection options or changing route templating
*/

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method as HttpMethod, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::{DexstreamError, Result};
use crate::types::{Descriptor, Method};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client fetching initial snapshots for stream keys.
///
/// Routes are path templates relative to the base URL; `{id}` and
/// `{network}` are substituted from the descriptor.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    http_client: Client,
    base_url: Url,
    routes: HashMap<Method, String>,
}

impl SnapshotClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            routes: HashMap::new(),
        })
    }

    /// Register the snapshot path template for a method.
    pub fn route(mut self, method: Method, template: impl Into<String>) -> Self {
        self.routes.insert(method, template.into());
        self
    }

    pub fn has_route(&self, method: Method) -> bool {
        self.routes.contains_key(&method)
    }

    /// Snapshot URL for `descriptor`, `None` if its method has no route.
    pub fn endpoint(&self, descriptor: &Descriptor) -> Option<Result<Url>> {
        let template = self.routes.get(&descriptor.method)?;
        let id: String = url::form_urlencoded::byte_serialize(descriptor.id.as_bytes()).collect();
        let path = template
            .replace("{id}", &id)
            .replace("{network}", &descriptor.network.to_string());
        Some(self.base_url.join(&path).map_err(DexstreamError::from))
    }

    pub(crate) fn request(&self, method: HttpMethod, url: Url) -> RequestBuilder {
        self.http_client.request(method, url)
    }

    /// Send a request and decode a JSON body, mapping non-2xx to `Api` errors.
    pub(crate) async fn send_json(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, bytes = body.len(), "snapshot request rejected");
            return Err(DexstreamError::api_error(status, body));
        }
        Ok(response.json::<Value>().await?)
    }
}
