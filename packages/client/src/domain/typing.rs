//! Expiry tracking for remote typing indicators.
//!
//! Each typist gets a deadline that is pushed back on every `typing` event.
//! The owner sleeps until [`TypingTracker::next_deadline`] and then calls
//! [`TypingTracker::expire`], which reports the chats whose typist set changed.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TypingTracker {
    expiry: Duration,
    /// Typists per chat, in the order the server listed them
    chats: HashMap<String, Vec<(String, Instant)>>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            chats: HashMap::new(),
        }
    }

    /// Replace the typist set of `chat_id` with `names`, all expiring at `now + expiry`.
    ///
    /// Returns the resulting names in the order given, without duplicates.
    pub fn observe(&mut self, chat_id: &str, names: &[String], now: Instant) -> Vec<String> {
        let deadline = now + self.expiry;
        let mut typists: Vec<(String, Instant)> = Vec::with_capacity(names.len());
        for name in names {
            if !name.is_empty() && !typists.iter().any(|(seen, _)| seen == name) {
                typists.push((name.clone(), deadline));
            }
        }

        if typists.is_empty() {
            self.chats.remove(chat_id);
        } else {
            self.chats.insert(chat_id.to_string(), typists);
        }
        self.typists(chat_id)
    }

    /// Drop a single typist, returning the remaining names.
    pub fn remove(&mut self, chat_id: &str, name: &str) -> Vec<String> {
        if let Some(typists) = self.chats.get_mut(chat_id) {
            typists.retain(|(typist, _)| typist != name);
            if typists.is_empty() {
                self.chats.remove(chat_id);
            }
        }
        self.typists(chat_id)
    }

    /// Forget every typist of `chat_id`
    pub fn clear(&mut self, chat_id: &str) {
        self.chats.remove(chat_id);
    }

    /// Remove typists whose deadline has passed.
    ///
    /// Returns `(chat_id, remaining names)` for every chat that changed.
    pub fn expire(&mut self, now: Instant) -> Vec<(String, Vec<String>)> {
        let mut changed = Vec::new();
        for (chat_id, typists) in self.chats.iter_mut() {
            let before = typists.len();
            typists.retain(|(_, deadline)| *deadline > now);
            if typists.len() != before {
                changed.push((chat_id.clone(), names_of(typists)));
            }
        }
        self.chats.retain(|_, typists| !typists.is_empty());
        changed.sort();
        changed
    }

    /// Earliest pending deadline across all chats
    pub fn next_deadline(&self) -> Option<Instant> {
        self.chats
            .values()
            .flat_map(|typists| typists.iter().map(|(_, deadline)| *deadline))
            .min()
    }

    pub fn typists(&self, chat_id: &str) -> Vec<String> {
        self.chats
            .get(chat_id)
            .map(|typists| names_of(typists))
            .unwrap_or_default()
    }
}

fn names_of(typists: &[(String, Instant)]) -> Vec<String> {
    typists.iter().map(|(name, _)| name.clone()).collect()
}
