/*
[INPUT]:  Test configuration and mock transport requirements
[OUTPUT]: Shared test utilities, fixtures, and frame helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for dexstream-adapter tests

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use dexstream_adapter::Descriptor;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::MockServer;

pub const MOCK_URL: &str = "ws://mock.local/stream";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Server push frame carrying `content` double-encoded in `Content`.
pub fn push_frame(descriptor: &Descriptor, content: &Value) -> String {
    json!({
        "Action": 3,
        "Subscription": {
            "Network": descriptor.network,
            "Method": descriptor.method,
            "ID": descriptor.id,
            "Content": content.to_string(),
        }
    })
    .to_string()
}

pub fn subscribe_frame(descriptor: &Descriptor) -> Value {
    json!({
        "Action": 0,
        "Subscription": {"Network": descriptor.network, "Method": descriptor.method, "ID": descriptor.id}
    })
}

pub fn unsubscribe_frame(descriptor: &Descriptor) -> Value {
    json!({
        "Action": 1,
        "Subscription": {"Network": descriptor.network, "Method": descriptor.method, "ID": descriptor.id}
    })
}

pub fn parse(frame: &str) -> Value {
    serde_json::from_str(frame).expect("client frames are JSON")
}

/// Handler that forwards every state it receives into a channel.
pub fn channel_handler() -> (
    impl Fn(&Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |value: &Value| {
        let _ = tx.send(value.clone());
    }, rx)
}

/// Await `future`, failing the test after one second.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(1), future)
        .await
        .expect("timed out waiting for stream event")
}
