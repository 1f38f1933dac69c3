/*
[INPUT]:  Previous materialized state + decoded incoming payload
[OUTPUT]: Next materialized state
[POS]:    WebSocket layer - per-subscription update merge strategies
[UPDATE]: When adding a strategy or changing list merge semantics
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a push combines with the state already held for its key.
///
/// Bound once per key at first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Server always sends authoritative full state.
    #[default]
    Replace,
    /// New items go before old ones (newest first).
    Merge,
    /// New items go after old ones.
    Append,
}

impl UpdateStrategy {
    pub fn apply(self, previous: Option<&Value>, incoming: Value) -> Value {
        match self {
            UpdateStrategy::Replace => incoming,
            UpdateStrategy::Merge => combine(previous, incoming, true),
            UpdateStrategy::Append => combine(previous, incoming, false),
        }
    }
}

fn combine(previous: Option<&Value>, incoming: Value, prepend: bool) -> Value {
    if let Value::Array(items) = &incoming
        && items.is_empty()
    {
        return previous.cloned().unwrap_or_else(|| Value::Array(Vec::new()));
    }

    let old = as_items(previous);
    let new = match incoming {
        Value::Array(items) => items,
        item => vec![item],
    };

    let (mut head, tail) = if prepend { (new, old) } else { (old, new) };
    head.extend(tail);
    Value::Array(head)
}

// Absent and null count as an empty history; any other scalar or object
// (e.g. a seeded snapshot) is a single entry.
fn as_items(previous: Option<&Value>) -> Vec<Value> {
    match previous {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}
