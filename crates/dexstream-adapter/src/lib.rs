/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public dexstream adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod http;
pub mod types;
pub mod ws;

pub use error::{DexstreamError, Result};

// Re-export commonly used types from http
pub use http::{ClientConfig, SnapshotClient, SnapshotSource};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionManager,
    ConnectionState,
    Connector,
    Envelope,
    HandlerId,
    ManagerConfig,
    MockConnector,
    MockPeer,
    PayloadCodec,
    ReconnectPolicy,
    TungsteniteConnector,
    UpdateStrategy,
};
