/*
[INPUT]:  Scripted server frames over the mock transport
[OUTPUT]: Materialized orderbook and trade state printed to stdout
[POS]:    Examples - multiplexed stream subscriptions
[UPDATE]: When the connection manager API changes
*/

use dexstream_adapter::*;
use serde_json::json;
use tokio::time::{Duration, sleep};

fn push(descriptor: &Descriptor, content: serde_json::Value) -> String {
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

/// Example: two streams sharing one transport
///
/// Runs against the in-memory mock so it needs no network. Swap
/// `ConnectionManager::with_connector(connector)` for
/// `ConnectionManager::new()` and pass a real endpoint to go live.
#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Dexstream WebSocket Example ===\n");

    let (connector, mut peer) = MockConnector::auto_open();
    let manager = ConnectionManager::with_connector(connector);

    let book = Descriptor::new(Network::Devnet, Method::Orderbook, "AB_CD");
    let trades = Descriptor::new(Network::Devnet, Method::TradesForSymbol, "AB_CD");

    manager.subscribe_typed::<Orderbook, _>(
        &book,
        |book| {
            println!(
                "  book: bid={:?} ask={:?} spread={:?}",
                book.best_bid().map(|level| level.price),
                book.best_ask().map(|level| level.price),
                book.spread()
            );
        },
        UpdateStrategy::Replace,
    );
    manager.subscribe_typed::<Vec<Trade>, _>(
        &trades,
        |trades| println!("  trades: {} held, newest id {:?}", trades.len(), trades.first().map(|t| t.id)),
        UpdateStrategy::Merge,
    );
    println!("✓ Subscriptions queued: {:?}", manager.pending_intents());

    manager.connect("wss://stream.example.invalid/ws");
    manager.connected().await;
    println!("✓ Connected; frames sent on open:");
    for frame in peer.drain_sent() {
        println!("  {frame}");
    }
    println!();

    peer.push("connected");
    peer.push(push(&book, json!({"bids": [{"price": "99.5", "quantity": "2"}], "asks": [{"price": "100.5", "quantity": "1"}]})));
    peer.push(push(&trades, json!([{"id": 1, "price": "100", "qty": "0.5"}])));
    peer.push(push(&trades, json!([{"id": 2, "price": "100.1", "qty": "0.2"}])));
    sleep(Duration::from_millis(50)).await;

    println!("\n✓ Trade state: {}", manager.state(&trades).unwrap_or_default());

    manager.close();
    println!("✓ WebSocket example complete");
    Ok(())
}
