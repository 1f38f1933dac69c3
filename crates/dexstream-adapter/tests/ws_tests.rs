/*
[INPUT]:  Connection manager scenarios over the mock transport
[OUTPUT]: Test results for connect/subscribe/dispatch/teardown behavior
[POS]:    Integration tests - WebSocket connection manager
[UPDATE]: When connection manager behavior changes
*/

mod common;

use std::time::Duration;

use common::{
    MOCK_URL, channel_handler, parse, push_frame, subscribe_frame, unsubscribe_frame, within,
};
use dexstream_adapter::{
    ConnectionManager, ConnectionState, Descriptor, ManagerConfig, Method, MockConnector, Network,
    PayloadCodec, ReconnectPolicy, UpdateStrategy,
};
use serde_json::json;

fn ticker() -> Descriptor {
    Descriptor::new(Network::Devnet, Method::Ticker, "AB_CD")
}

fn trades() -> Descriptor {
    Descriptor::new(Network::Devnet, Method::TradesForSymbol, "AB_CD")
}

#[tokio::test]
async fn test_subscribe_before_open_is_flushed_once() {
    let (connector, mut peer) = MockConnector::new();
    let manager = ConnectionManager::with_connector(connector);

    assert!(manager.connect(MOCK_URL));
    manager.subscribe(&ticker(), |_| {}, UpdateStrategy::Replace);
    assert_eq!(manager.pending_intents(), (1, 0));
    assert!(!manager.is_connected());

    peer.open();
    within(manager.connected()).await;
    assert!(manager.is_connected());

    let frame = within(peer.next_sent()).await.expect("subscribe frame");
    assert_eq!(parse(&frame), subscribe_frame(&ticker()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(peer.drain_sent().is_empty());
    assert_eq!(manager.pending_intents(), (0, 0));
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (connector, peer) = MockConnector::new();
    let manager = ConnectionManager::with_connector(connector);

    assert!(manager.connect(MOCK_URL));
    assert!(!manager.connect(MOCK_URL));

    peer.open();
    within(manager.connected()).await;
    assert!(!manager.connect(MOCK_URL));
    assert_eq!(peer.connect_count(), 1);

    // A second waiter resolves immediately from the latched signal.
    within(manager.connected()).await;
}

#[tokio::test]
async fn test_merge_stream_dispatch_and_teardown() {
    let (connector, mut peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);
    manager.connect(MOCK_URL);
    within(manager.connected()).await;

    let (h1, mut rx1) = channel_handler();
    let (h2, mut rx2) = channel_handler();
    let id1 = manager.subscribe(&trades(), h1, UpdateStrategy::Merge);
    let id2 = manager.subscribe(&trades(), h2, UpdateStrategy::Merge);
    assert_eq!(manager.handler_count(&trades()), 2);

    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&trades()));
    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&trades()));

    assert!(peer.push(push_frame(&trades(), &json!([{"id": 1}]))));
    assert_eq!(within(rx1.recv()).await, Some(json!([{"id": 1}])));
    assert_eq!(within(rx2.recv()).await, Some(json!([{"id": 1}])));
    assert_eq!(manager.state(&trades()), Some(json!([{"id": 1}])));

    assert!(peer.push(push_frame(&trades(), &json!([{"id": 2}]))));
    assert_eq!(within(rx1.recv()).await, Some(json!([{"id": 2}, {"id": 1}])));
    assert_eq!(within(rx2.recv()).await, Some(json!([{"id": 2}, {"id": 1}])));

    assert!(manager.unsubscribe(&trades(), id1));
    assert!(manager.unsubscribe(&trades(), id2));
    assert_eq!(
        parse(&within(peer.next_sent()).await.unwrap()),
        unsubscribe_frame(&trades())
    );
    assert_eq!(manager.state(&trades()), None);

    // Frames are handled in order, so once the ticker push lands the trade
    // push before it has been processed (and discarded).
    let (ticker_handler, mut ticker_rx) = channel_handler();
    manager.subscribe(&ticker(), ticker_handler, UpdateStrategy::Replace);
    assert!(peer.push(push_frame(&trades(), &json!([{"id": 3}]))));
    assert!(peer.push(push_frame(&ticker(), &json!({"symbol": "AB_CD"}))));
    assert_eq!(within(ticker_rx.recv()).await, Some(json!({"symbol": "AB_CD"})));

    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_err());
    assert_eq!(manager.state(&trades()), None);
}

#[tokio::test]
async fn test_sentinel_and_garbage_frames_are_absorbed() {
    let (connector, peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);
    manager.connect(MOCK_URL);
    within(manager.connected()).await;

    let (handler, mut rx) = channel_handler();
    manager.subscribe(&trades(), handler, UpdateStrategy::Append);

    peer.push("connected");
    peer.push("<html>502</html>");
    peer.push(r#"{"Action":3,"Subscription":{"Network":3,"Method":1,"ID":"AB_CD","Content":"not json"}}"#);
    peer.push(push_frame(&trades(), &json!({"id": 1})));
    peer.push(push_frame(&trades(), &json!([{"id": 2}])));

    assert_eq!(within(rx.recv()).await, Some(json!([{"id": 1}])));
    assert_eq!(within(rx.recv()).await, Some(json!([{"id": 1}, {"id": 2}])));
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_drop_keeps_registry_and_reconnect_flushes_only_pending() {
    let (connector, mut peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);
    let mut states = manager.connection_state();

    manager.connect(MOCK_URL);
    within(manager.connected()).await;
    manager.subscribe(&trades(), |_| {}, UpdateStrategy::Merge);
    within(peer.next_sent()).await;

    peer.drop_connection();
    within(states.wait_for(|state| *state == ConnectionState::Disconnected))
        .await
        .unwrap();
    assert!(!manager.is_connected());
    assert_eq!(manager.subscription_count(), 1);

    manager.subscribe(&ticker(), |_| {}, UpdateStrategy::Replace);
    assert_eq!(manager.pending_intents(), (1, 0));

    assert!(manager.connect(MOCK_URL));
    within(states.wait_for(|state| *state == ConnectionState::Connected))
        .await
        .unwrap();
    assert_eq!(peer.connect_count(), 2);

    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&ticker()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(peer.drain_sent().is_empty());
}

#[tokio::test]
async fn test_reconnect_policy_resubscribes_when_enabled() {
    let (connector, mut peer) = MockConnector::auto_open();
    let config = ManagerConfig {
        reconnect: ReconnectPolicy::Fixed {
            delay_ms: 10,
            max_retries: Some(3),
        },
        resubscribe_on_reconnect: true,
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::with_parts(connector, config, PayloadCodec::default());
    manager.connect(MOCK_URL);
    within(manager.connected()).await;

    manager.subscribe(&trades(), |_| {}, UpdateStrategy::Merge);
    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&trades()));

    peer.drop_connection();
    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&trades()));
    assert_eq!(peer.connect_count(), 2);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_close_resets_and_allows_new_connection() {
    let (connector, peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);
    let mut states = manager.connection_state();
    manager.connect(MOCK_URL);
    within(manager.connected()).await;

    let (handler, mut rx) = channel_handler();
    manager.subscribe(&trades(), handler, UpdateStrategy::Merge);
    manager.set_initial_state(&trades(), json!([{"id": 0}]));

    manager.close();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    assert_eq!(manager.subscription_count(), 0);
    assert_eq!(manager.state(&trades()), None);
    assert!(!manager.is_connected());

    peer.push(push_frame(&trades(), &json!([{"id": 1}])));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(manager.state(&trades()), None);

    assert!(manager.connect(MOCK_URL));
    within(states.wait_for(|state| *state == ConnectionState::Connected))
        .await
        .unwrap();
    assert_eq!(peer.connect_count(), 2);
}

#[tokio::test]
async fn test_clones_share_one_manager() {
    let (connector, peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);
    let other = manager.clone();

    manager.connect(MOCK_URL);
    assert!(!other.connect(MOCK_URL));
    within(other.connected()).await;

    let (handler, mut rx) = channel_handler();
    other.subscribe(&ticker(), handler, UpdateStrategy::Replace);
    peer.push(push_frame(&ticker(), &json!({"symbol": "AB_CD", "price": "1.5"})));
    assert_eq!(
        within(rx.recv()).await,
        Some(json!({"symbol": "AB_CD", "price": "1.5"}))
    );
    assert_eq!(manager.subscription_count(), 1);
}

#[tokio::test]
async fn test_connect_timeout_gives_up_and_allows_new_connect() {
    let (connector, peer) = MockConnector::new();
    let config = ManagerConfig {
        connect_timeout_ms: Some(50),
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::with_parts(connector, config, PayloadCodec::default());
    let mut states = manager.connection_state();

    assert!(manager.connect(MOCK_URL));
    within(states.wait_for(|state| *state == ConnectionState::Disconnected))
        .await
        .unwrap();
    assert!(!manager.is_connected());
    assert_eq!(peer.connect_count(), 1);

    assert!(manager.connect(MOCK_URL));
    peer.open();
    within(manager.connected()).await;
    assert_eq!(peer.connect_count(), 2);
}

#[tokio::test]
async fn test_exponential_backoff_retries_until_exhausted() {
    let (connector, peer) = MockConnector::new();
    let config = ManagerConfig {
        connect_timeout_ms: Some(20),
        reconnect: ReconnectPolicy::ExponentialBackoff {
            base_ms: 10,
            max_ms: 40,
            max_retries: Some(3),
        },
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::with_parts(connector, config, PayloadCodec::default());
    let mut states = manager.connection_state();

    manager.connect(MOCK_URL);
    within(states.wait_for(|state| *state == ConnectionState::Disconnected))
        .await
        .unwrap();
    assert_eq!(peer.connect_count(), 4);
    assert!(manager.connect(MOCK_URL));
}

#[tokio::test]
async fn test_exponential_backoff_recovers_once_server_accepts() {
    let (connector, mut peer) = MockConnector::new();
    let config = ManagerConfig {
        connect_timeout_ms: Some(20),
        reconnect: ReconnectPolicy::ExponentialBackoff {
            base_ms: 10,
            max_ms: 40,
            max_retries: Some(10),
        },
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::with_parts(connector, config, PayloadCodec::default());
    let mut states = manager.connection_state();

    manager.connect(MOCK_URL);
    manager.subscribe(&ticker(), |_| {}, UpdateStrategy::Replace);
    within(states.wait_for(|state| matches!(state, ConnectionState::Reconnecting { .. })))
        .await
        .unwrap();

    peer.open();
    within(manager.connected()).await;
    assert!(peer.connect_count() >= 2);
    assert_eq!(parse(&within(peer.next_sent()).await.unwrap()), subscribe_frame(&ticker()));
}
