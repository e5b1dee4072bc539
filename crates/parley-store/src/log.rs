use std::collections::VecDeque;

use parley_types::limits::MAX_HISTORY;
use parley_types::models::Message;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Bounded, ordered message log. Newest messages are appended at the back;
/// once full, every push evicts the oldest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLog {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::bounded(MAX_HISTORY)
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(MAX_HISTORY)),
            capacity,
        }
    }

    /// Append a message. Returns the evicted message, if any.
    ///
    /// Eviction never touches attachment storage; only explicit deletes do.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        self.messages.push_back(message);
        if self.messages.len() > self.capacity {
            self.messages.pop_front()
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == id)?;
        self.messages.remove(idx)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    /// Owned copy of the log, oldest first.
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }
}

// Persisted as a plain JSON array. Loading an oversized array keeps the newest entries.

impl Serialize for MessageLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.messages.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let messages = Vec::<Message>::deserialize(deserializer)?;
        let mut log = MessageLog::new();
        for message in messages {
            log.push(message);
        }
        Ok(log)
    }
}
