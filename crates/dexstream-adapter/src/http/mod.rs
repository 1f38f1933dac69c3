/*
[INPUT]:  HTTP client configuration and snapshot routes
[OUTPUT]: Initial snapshot documents for stream keys
[POS]:    HTTP layer - out-of-band snapshot fetching
[UPDATE]: When adding snapshot sources or changing client behavior
*/

pub mod client;
pub mod snapshot;

pub use client::{ClientConfig, SnapshotClient};
pub use snapshot::SnapshotSource;
