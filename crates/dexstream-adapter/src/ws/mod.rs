/*
[INPUT]:  Stream endpoint URL and subscription descriptors
[OUTPUT]: Materialized real-time state delivered to registered handlers
[POS]:    WebSocket layer - multiplexed real-time subscriptions
[UPDATE]: When adding strategies, decoders or changing connection logic
*/

pub mod codec;
pub mod manager;
pub mod message;
pub mod mock;
pub mod reconnect;
pub mod registry;
pub mod store;
pub mod strategy;
pub mod transport;

pub use codec::PayloadCodec;
pub use manager::{ConnectionManager, ConnectionState, ManagerConfig};
pub use message::{Envelope, WireSubscription};
pub use mock::{MockConnector, MockPeer};
pub use reconnect::ReconnectPolicy;
pub use registry::{Handler, HandlerId};
pub use strategy::UpdateStrategy;
pub use transport::{Connector, Transport, TungsteniteConnector};
