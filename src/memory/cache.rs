//! Rolling recent-turn cache
//!
//! Bounded FIFO buffer of the most recent conversation turns, keyed by
//! conversation id. This is the fast path for prompt assembly; the durable
//! markdown log is the authoritative record. The cache is volatile and starts
//! empty after a process restart.

use dashmap::DashMap;
use std::collections::VecDeque;

/// Maximum turns kept per conversation
pub const MAX_CACHED_TURNS: usize = 10;

#[derive(Debug, Clone)]
pub struct CachedTurn {
    pub role: String,
    pub content: String,
}

/// Shared in-process cache of recent turns per conversation.
///
/// Each map entry is locked as a whole while mutated, so a reader always sees
/// a consistent ordered slice, never a half-evicted one.
pub struct ConversationCache {
    entries: DashMap<String, VecDeque<CachedTurn>>,
    capacity: usize,
}

impl ConversationCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHED_TURNS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest when the buffer is full
    pub fn add(&self, conversation_id: &str, role: &str, content: &str) {
        let mut history = self
            .entries
            .entry(conversation_id.to_string())
            .or_insert_with(VecDeque::new);

        history.push_back(CachedTurn {
            role: role.to_string(),
            content: content.to_string(),
        });

        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// Render the recent window as "role: content" lines, oldest first
    pub fn recent_context(&self, conversation_id: &str) -> String {
        self.entries
            .get(conversation_id)
            .map(|history| {
                history
                    .iter()
                    .map(|t| format!("{}: {}", t.role, t.content))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// Number of turns currently cached for a conversation
    pub fn len(&self, conversation_id: &str) -> usize {
        self.entries.get(conversation_id).map(|h| h.len()).unwrap_or(0)
    }

    /// Drop all cached turns for a conversation
    pub fn clear(&self, conversation_id: &str) {
        self.entries.remove(conversation_id);
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}
