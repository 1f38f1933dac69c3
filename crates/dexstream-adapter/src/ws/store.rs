/*
[INPUT]:  Materialized values per subscription key (pushes and seeds)
[OUTPUT]: Last-known state lookup independent of handlers
[POS]:    WebSocket layer - state store
[UPDATE]: When changing state retention rules
*/

use std::collections::HashMap;

use serde_json::Value;

use crate::types::SubscriptionKey;

#[derive(Debug, Default)]
pub struct StateStore {
    values: HashMap<SubscriptionKey, Value>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: SubscriptionKey, value: Value) {
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: &SubscriptionKey) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
