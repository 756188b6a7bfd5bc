//! Per-caller conversation memory.
//!
//! Each caller id owns a bounded message list. Old messages are pruned
//! from the front once the list exceeds the configured window.

use chrono::{Local, NaiveDateTime};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One remembered message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
    pub at: NaiveDateTime,
}

/// What is remembered about a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub user_id: String,
    pub message_count: usize,
    pub last_activity: Option<NaiveDateTime>,
}

/// Thread-safe memory partitioned by caller id.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    partitions: Arc<DashMap<String, Vec<MemoryMessage>>>,
    max_messages: usize,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self {
            partitions: Arc::new(DashMap::new()),
            max_messages: max_messages.max(2),
        }
    }

    /// Remember a question and the answer it got.
    pub fn record(&self, user_id: &str, question: &str, answer: &str) {
        let now = Local::now().naive_local();
        let mut entry = self.partitions.entry(user_id.to_string()).or_default();

        entry.push(MemoryMessage {
            role: "user".to_string(),
            content: question.to_string(),
            at: now,
        });
        entry.push(MemoryMessage {
            role: "assistant".to_string(),
            content: answer.to_string(),
            at: now,
        });

        if entry.len() > self.max_messages {
            let remove_count = entry.len() - self.max_messages;
            entry.drain(..remove_count);
            debug!("Pruned {} old messages for {}", remove_count, user_id);
        }
    }

    /// Snapshot of a caller's messages, oldest first.
    pub fn history(&self, user_id: &str) -> Vec<MemoryMessage> {
        self.partitions
            .get(user_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn info(&self, user_id: &str) -> MemoryInfo {
        let history = self.history(user_id);
        MemoryInfo {
            user_id: user_id.to_string(),
            message_count: history.len(),
            last_activity: history.last().map(|m| m.at),
        }
    }

    /// Forget one caller. Returns whether anything was remembered.
    pub fn clear(&self, user_id: &str) -> bool {
        self.partitions.remove(user_id).is_some()
    }

    pub fn user_count(&self) -> usize {
        self.partitions.len()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_info() {
        let memory = ConversationMemory::new(10);
        memory.record("alice", "how are sales?", "fine");

        let info = memory.info("alice");
        assert_eq!(info.message_count, 2);
        assert!(info.last_activity.is_some());
        assert_eq!(memory.history("alice")[0].role, "user");
        assert_eq!(memory.info("bob").message_count, 0);
    }

    #[test]
    fn test_sliding_window_keeps_latest() {
        let memory = ConversationMemory::new(4);
        for i in 0..5 {
            memory.record("u", &format!("q{}", i), &format!("a{}", i));
        }

        let history = memory.history("u");
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "q3");
        assert_eq!(history[3].content, "a4");
    }

    #[test]
    fn test_partitions_are_independent() {
        let memory = ConversationMemory::default();
        memory.record("a", "q", "r");
        memory.record("b", "q", "r");

        assert!(memory.clear("a"));
        assert!(!memory.clear("a"));
        assert_eq!(memory.info("b").message_count, 2);
        assert_eq!(memory.user_count(), 1);
    }
}
