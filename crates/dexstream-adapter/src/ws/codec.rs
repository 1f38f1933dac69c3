/*
[INPUT]:  Method of a push + its JSON-encoded `Content` string
[OUTPUT]: Shape-checked JSON payload ready for the update strategy
[POS]:    WebSocket layer - second-stage payload decoding
[UPDATE]: When a method's payload shape changes or a method is added
*/

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{DexstreamError, Result};
use crate::types::Method;

/// Decodes the inner `Content` document of one method.
pub type Decoder = fn(Method, &str) -> Result<Value>;

/// Lookup table from method to payload decoder.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    decoders: HashMap<Method, Decoder>,
}

impl PayloadCodec {
    /// Table with no method-specific checks; everything decodes as any JSON.
    pub fn permissive() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, method: Method, decoder: Decoder) -> &mut Self {
        self.decoders.insert(method, decoder);
        self
    }

    pub fn decode(&self, method: Method, content: &str) -> Result<Value> {
        let decoder = self.decoders.get(&method).copied().unwrap_or(decode_any);
        decoder(method, content)
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        let mut codec = Self::permissive();
        codec
            .register(Method::TradesForSymbol, decode_list_or_object)
            .register(Method::TradesForAccount, decode_list_or_object)
            .register(Method::TradesForAccountAndSymbol, decode_list_or_object)
            .register(Method::Ohlc, decode_list_or_object)
            .register(Method::Ticker, decode_list_or_object)
            .register(Method::Orderbook, decode_object)
            .register(Method::OrderbookForSymbolAndAccount, decode_object);
        codec
    }
}

pub fn decode_any(_method: Method, content: &str) -> Result<Value> {
    Ok(serde_json::from_str(content)?)
}

/// Trade, OHLC and ticker pushes: a batch or a single record.
pub fn decode_list_or_object(method: Method, content: &str) -> Result<Value> {
    let value = decode_any(method, content)?;
    match &value {
        Value::Array(items) => {
            if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                return Err(shape_error(method, "list entries must be objects", bad));
            }
            Ok(value)
        }
        Value::Object(_) => Ok(value),
        other => Err(shape_error(method, "expected a list or an object", other)),
    }
}

/// Orderbook pushes: always a full snapshot object.
pub fn decode_object(method: Method, content: &str) -> Result<Value> {
    let value = decode_any(method, content)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(shape_error(method, "expected an object", &value))
    }
}

fn shape_error(method: Method, reason: &str, found: &Value) -> DexstreamError {
    DexstreamError::PayloadShape {
        method,
        reason: format!("{reason}, found {}", kind_of(found)),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trades_accept_list_and_object() {
        let codec = PayloadCodec::default();
        assert_eq!(
            codec.decode(Method::TradesForSymbol, r#"[{"id":1}]"#).unwrap(),
            json!([{"id": 1}])
        );
        assert_eq!(
            codec.decode(Method::TradesForAccount, r#"{"id":2}"#).unwrap(),
            json!({"id": 2})
        );
        assert_eq!(codec.decode(Method::Ohlc, "[]").unwrap(), json!([]));
    }

    #[test]
    fn test_trades_reject_scalars() {
        let codec = PayloadCodec::default();
        let err = codec.decode(Method::TradesForSymbol, "42").unwrap_err();
        assert!(matches!(
            err,
            DexstreamError::PayloadShape {
                method: Method::TradesForSymbol,
                ..
            }
        ));
        assert!(codec.decode(Method::TradesForSymbol, "[1, 2]").is_err());
    }

    #[test]
    fn test_orderbook_requires_object() {
        let codec = PayloadCodec::default();
        assert!(codec.decode(Method::Orderbook, r#"{"bids":[],"asks":[]}"#).is_ok());
        assert!(codec.decode(Method::Orderbook, "[]").is_err());
    }

    #[test]
    fn test_invalid_inner_json_is_serialization_error() {
        let codec = PayloadCodec::default();
        let err = codec.decode(Method::Ticker, "{not json").unwrap_err();
        assert!(matches!(err, DexstreamError::Serialization(_)));
    }

    #[test]
    fn test_unregistered_method_decodes_any_json() {
        let codec = PayloadCodec::default();
        assert_eq!(codec.decode(Method::Wallet, "\"hi\"").unwrap(), json!("hi"));
    }

    #[test]
    fn test_register_overrides_decoder() {
        let mut codec = PayloadCodec::permissive();
        assert!(codec.decode(Method::Orderbook, "[]").is_ok());
        codec.register(Method::Orderbook, decode_object);
        assert!(codec.decode(Method::Orderbook, "[]").is_err());
    }
}
