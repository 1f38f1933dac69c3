/*
[INPUT]:  Materialized stream state (JSON values)
[OUTPUT]: Typed views over trades, tickers, OHLC bars and orderbooks
[POS]:    Data layer - typed payload models for consumers
[UPDATE]: When payload schemas change or new streams are added
*/

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[serde(alias = "BUY", alias = "Buy")]
    Buy,
    #[serde(alias = "SELL", alias = "Sell")]
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, alias = "qty", alias = "amount", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(default, alias = "time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(default, alias = "price", alias = "lastPrice")]
    pub last_price: Option<Decimal>,
    #[serde(default, alias = "change24h")]
    pub change_24h: Option<Decimal>,
    #[serde(default, alias = "high24h")]
    pub high_24h: Option<Decimal>,
    #[serde(default, alias = "low24h")]
    pub low_24h: Option<Decimal>,
    #[serde(default, alias = "volume24h")]
    pub volume_24h: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    #[serde(alias = "timestamp", alias = "t")]
    pub time: i64,
    #[serde(alias = "o")]
    pub open: Decimal,
    #[serde(alias = "h")]
    pub high: Decimal,
    #[serde(alias = "l")]
    pub low: Decimal,
    #[serde(alias = "c")]
    pub close: Decimal,
    #[serde(default, alias = "v")]
    pub volume: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub price: Decimal,
    #[serde(alias = "qty", alias = "amount", alias = "size")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Orderbook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub bids: Vec<OrderbookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderbookLevel>,
}

impl Orderbook {
    pub fn best_bid(&self) -> Option<&OrderbookLevel> {
        self.bids.iter().max_by(|a, b| a.price.cmp(&b.price))
    }

    pub fn best_ask(&self) -> Option<&OrderbookLevel> {
        self.asks.iter().min_by(|a, b| a.price.cmp(&b.price))
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

/// Convert materialized state into a typed view.
pub fn decode_state<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}
