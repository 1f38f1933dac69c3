/*
[INPUT]:  Wire protocol enumerations (integer encoded)
[OUTPUT]: Typed Rust enums with integer serialization support
[POS]:    Data layer - wire-stable enumerations
[UPDATE]: When the server adds networks, methods or actions
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DexstreamError;

/// Frame action carried in the `Action` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Action {
    Subscribe = 0,
    Unsubscribe = 1,
    Close = 2,
    Response = 3,
}

/// Network the subscribed stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Network {
    #[default]
    Unspecified = 0,
    Mainnet = 1,
    Testnet = 2,
    Devnet = 3,
}

/// Stream method; decides how the subscription ID is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Method {
    #[default]
    Unspecified = 0,
    TradesForSymbol = 1,
    TradesForAccount = 2,
    TradesForAccountAndSymbol = 3,
    Ohlc = 4,
    Ticker = 5,
    Orderbook = 6,
    OrderbookForSymbolAndAccount = 7,
    /// Reserved by the server; never subscribed by the manager itself.
    Wallet = 8,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Unspecified,
        Method::TradesForSymbol,
        Method::TradesForAccount,
        Method::TradesForAccountAndSymbol,
        Method::Ohlc,
        Method::Ticker,
        Method::Orderbook,
        Method::OrderbookForSymbolAndAccount,
        Method::Wallet,
    ];

    /// True for the trade history streams.
    pub fn is_trades(self) -> bool {
        matches!(
            self,
            Method::TradesForSymbol | Method::TradesForAccount | Method::TradesForAccountAndSymbol
        )
    }
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Unspecified,
        Network::Mainnet,
        Network::Testnet,
        Network::Devnet,
    ];
}

macro_rules! wire_int {
    ($ty:ident, $label:literal, { $($value:literal => $variant:ident = $name:literal),+ $(,)? }) => {
        impl From<$ty> for i32 {
            fn from(value: $ty) -> Self {
                value as i32
            }
        }

        impl TryFrom<i32> for $ty {
            type Error = DexstreamError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($ty::$variant),)+
                    other => Err(DexstreamError::UnknownEnumValue {
                        kind: $label,
                        value: other,
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", *self as i32)
            }
        }

        impl $ty {
            /// Human-readable snake_case name, as accepted by `FromStr`.
            pub fn name(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        /// Accepts the snake_case name or the wire integer.
        impl FromStr for $ty {
            type Err = DexstreamError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if let Ok(value) = s.parse::<i32>() {
                    return $ty::try_from(value);
                }
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(DexstreamError::Config(format!("unknown {} '{s}'", $label))),
                }
            }
        }
    };
}

wire_int!(Action, "action", {
    0 => Subscribe = "subscribe",
    1 => Unsubscribe = "unsubscribe",
    2 => Close = "close",
    3 => Response = "response",
});

wire_int!(Network, "network", {
    0 => Unspecified = "unspecified",
    1 => Mainnet = "mainnet",
    2 => Testnet = "testnet",
    3 => Devnet = "devnet",
});

wire_int!(Method, "method", {
    0 => Unspecified = "unspecified",
    1 => TradesForSymbol = "trades_for_symbol",
    2 => TradesForAccount = "trades_for_account",
    3 => TradesForAccountAndSymbol = "trades_for_account_and_symbol",
    4 => Ohlc = "ohlc",
    5 => Ticker = "ticker",
    6 => Orderbook = "orderbook",
    7 => OrderbookForSymbolAndAccount = "orderbook_for_symbol_and_account",
    8 => Wallet = "wallet",
});
