use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push subscription descriptors keyed by display name. The descriptor is
/// opaque here; only the push transport interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subscriptions {
    by_name: HashMap<String, Value>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins.
    pub fn upsert(&mut self, name: &str, descriptor: Value) {
        self.by_name.insert(name.to_string(), descriptor);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.by_name.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Owned copy of every `(name, descriptor)` pair.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.by_name
            .iter()
            .map(|(name, sub)| (name.clone(), sub.clone()))
            .collect()
    }
}
