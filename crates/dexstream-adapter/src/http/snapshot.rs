/*
[INPUT]:  Subscription descriptors needing an initial value
[OUTPUT]: Snapshot JSON documents used to seed the state store
[POS]:    HTTP layer - snapshot source seam used by the connection manager
[UPDATE]: When adding snapshot sources or changing seeding behavior
*/

use async_trait::async_trait;
use reqwest::Method as HttpMethod;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::http::SnapshotClient;
use crate::types::Descriptor;
use crate::ws::ConnectionManager;

/// Supplies the out-of-band initial value for a stream key.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` when the source has nothing for this descriptor.
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Option<Value>>;
}

#[async_trait]
impl SnapshotSource for SnapshotClient {
    /// GET {base}{route(method)}
    async fn fetch(&self, descriptor: &Descriptor) -> Result<Option<Value>> {
        let Some(url) = self.endpoint(descriptor) else {
            return Ok(None);
        };
        let url = url?;
        debug!(%url, key = %descriptor.key(), "fetching snapshot");
        let builder = self.request(HttpMethod::GET, url);
        Ok(Some(self.send_json(builder).await?))
    }
}

impl ConnectionManager {
    /// Fetch a snapshot and seed it as the initial state for `descriptor`.
    ///
    /// Returns whether a value was seeded.
    pub async fn seed_from<S>(&self, source: &S, descriptor: &Descriptor) -> Result<bool>
    where
        S: SnapshotSource + ?Sized,
    {
        match source.fetch(descriptor).await? {
            Some(value) => {
                self.set_initial_state(descriptor, value);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
