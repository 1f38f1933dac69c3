/*
[INPUT]:  Subscribe / unsubscribe calls keyed by descriptor
[OUTPUT]: Ordered handler lists and bound strategy per subscription key
[POS]:    WebSocket layer - subscription registry (reference counted by handler)
[UPDATE]: When changing handler identity or entry lifecycle
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::strategy::UpdateStrategy;
use crate::types::{Descriptor, SubscriptionKey};

/// Callback receiving the materialized state after every push.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Token returned by subscribe; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// One subscription key's handlers and strategy.
pub struct Registration {
    descriptor: Descriptor,
    strategy: UpdateStrategy,
    handlers: Vec<(HandlerId, Handler)>,
}

impl Registration {
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn strategy(&self) -> UpdateStrategy {
        self.strategy
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> Vec<Handler> {
        self.handlers.iter().map(|(_, h)| h.clone()).collect()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("descriptor", &self.descriptor)
            .field("strategy", &self.strategy)
            .field(
                "handlers",
                &self
                    .handlers
                    .iter()
                    .map(|(id, _)| id.as_u64())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Result of removing a handler.
#[derive(Debug)]
pub enum Removal {
    /// No entry for the key, or the handler was not part of it.
    NotFound,
    /// Handler removed, others still registered.
    HandlerRemoved { remaining: usize },
    /// Last handler removed; the entry is gone.
    EntryRemoved(Registration),
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, Registration>,
    next_handler_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, creating the entry on first use.
    ///
    /// `strategy` is only used when the entry is created. Returns the
    /// handler token and whether a new entry was created.
    pub fn register(
        &mut self,
        descriptor: &Descriptor,
        handler: Handler,
        strategy: UpdateStrategy,
    ) -> (HandlerId, bool) {
        self.next_handler_id += 1;
        let id = HandlerId(self.next_handler_id);

        let mut created = false;
        let entry = self.entries.entry(descriptor.key()).or_insert_with(|| {
            created = true;
            Registration {
                descriptor: descriptor.clone(),
                strategy,
                handlers: Vec::new(),
            }
        });
        entry.handlers.push((id, handler));

        (id, created)
    }

    pub fn remove(&mut self, key: &SubscriptionKey, id: HandlerId) -> Removal {
        let Some(entry) = self.entries.get_mut(key) else {
            return Removal::NotFound;
        };

        let before = entry.handlers.len();
        entry.handlers.retain(|(handler_id, _)| *handler_id != id);
        if entry.handlers.len() == before {
            return Removal::NotFound;
        }

        if entry.handlers.is_empty() {
            match self.entries.remove(key) {
                Some(removed) => Removal::EntryRemoved(removed),
                None => Removal::NotFound,
            }
        } else {
            Removal::HandlerRemoved {
                remaining: entry.handlers.len(),
            }
        }
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&Registration> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
