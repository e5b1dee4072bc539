use std::collections::HashMap;

use parley_types::limits::THREAD_KEY_SEPARATOR;
use parley_types::models::{MessagePreview, PrivateChatSummary};
use serde::{Deserialize, Serialize};

use crate::log::MessageLog;

/// Canonical key of the private thread between `a` and `b`: both names
/// sorted and joined by `|`, so either participant derives the same key.
pub fn thread_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", first, THREAD_KEY_SEPARATOR, second)
}

/// Split a thread key back into its two participant names.
pub fn participants(key: &str) -> Option<(&str, &str)> {
    key.split_once(THREAD_KEY_SEPARATOR)
}

/// Resolve a client-supplied key on behalf of `member`. Returns the
/// canonical key (whatever order the names came in) and the other
/// participant, or `None` if `member` is not one of the two.
pub fn resolve_thread<'a>(key: &'a str, member: &str) -> Option<(String, &'a str)> {
    let (a, b) = participants(key)?;
    let other = if a == member {
        b
    } else if b == member {
        a
    } else {
        return None;
    };
    Some((thread_key(a, b), other))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateThread {
    pub messages: MessageLog,
}

/// All private threads, keyed by canonical thread key. Threads are created
/// lazily and never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadStore {
    threads: HashMap<String, PrivateThread>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PrivateThread> {
        self.threads.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PrivateThread> {
        self.threads.get_mut(key)
    }

    pub fn get_or_create(&mut self, key: &str) -> &mut PrivateThread {
        self.threads.entry(key.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut PrivateThread)> {
        self.threads.iter_mut()
    }

    /// Threads `name` takes part in, busiest first.
    pub fn summaries_for(&self, name: &str) -> Vec<PrivateChatSummary> {
        let mut chats: Vec<PrivateChatSummary> = self
            .threads
            .iter()
            .filter_map(|(key, thread)| {
                let (a, b) = participants(key)?;
                let with = if a == name {
                    b
                } else if b == name {
                    a
                } else {
                    return None;
                };
                Some(PrivateChatSummary {
                    chat_id: key.clone(),
                    with: with.to_string(),
                    last_message: thread.messages.last().map(MessagePreview::from),
                    message_count: thread.messages.len(),
                })
            })
            .collect();

        chats.sort_by(|x, y| {
            y.message_count
                .cmp(&x.message_count)
                .then_with(|| x.chat_id.cmp(&y.chat_id))
        });
        chats
    }
}
