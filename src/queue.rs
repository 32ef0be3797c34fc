//! Per-agent bounded message queues.
//!
//! One FIFO queue per agent behind a single manager lock. A push onto a full
//! queue evicts the single oldest entry, so insertion never fails; the
//! newest message always wins over the oldest.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::AgentMessage;

/// Default capacity of a per-agent queue.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Default read limit for [`MessageQueueManager::get_messages`].
pub const DEFAULT_READ_LIMIT: usize = 50;

/// A single agent's bounded FIFO queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueue {
    pub agent_id: String,
    pub queue: VecDeque<AgentMessage>,
    pub max_size: usize,
    pub last_processed: Option<DateTime<Utc>>,
}

impl MessageQueue {
    pub fn new(agent_id: impl Into<String>, max_size: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            queue: VecDeque::new(),
            max_size,
            last_processed: None,
        }
    }

    /// Append a message, evicting the oldest entry first when full.
    /// Returns the evicted message, if any.
    fn push(&mut self, message: AgentMessage) -> Option<AgentMessage> {
        let evicted = if self.queue.len() >= self.max_size {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(message);
        evicted
    }

    /// The most recent `limit` messages, oldest-to-newest.
    fn recent(&self, limit: usize) -> Vec<AgentMessage> {
        let skip = self.queue.len().saturating_sub(limit);
        self.queue.iter().skip(skip).cloned().collect()
    }

    fn purge_expired(&mut self) -> usize {
        let before = self.queue.len();
        self.queue.retain(|m| !m.is_expired());
        before - self.queue.len()
    }
}

/// Owns every agent's queue; all access goes through its operations.
#[derive(Debug)]
pub struct MessageQueueManager {
    queues: RwLock<HashMap<String, MessageQueue>>,
    default_max_size: usize,
}

impl MessageQueueManager {
    pub fn new(default_max_size: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            default_max_size,
        }
    }

    /// Create a queue for an agent. No-op if one already exists.
    pub fn create_queue(&self, agent_id: &str) {
        self.create_queue_with_size(agent_id, self.default_max_size);
    }

    /// Create a queue with an explicit capacity. No-op if one already exists.
    pub fn create_queue_with_size(&self, agent_id: &str, max_size: usize) {
        let mut queues = self.queues.write().unwrap();
        queues
            .entry(agent_id.to_string())
            .or_insert_with(|| MessageQueue::new(agent_id, max_size));
    }

    /// Enqueue a message for an agent, auto-creating the queue.
    ///
    /// Always succeeds: a full queue drops its oldest entry to make room,
    /// which is logged as a warning rather than surfaced as an error.
    pub fn add_message(&self, agent_id: &str, message: AgentMessage) -> bool {
        let mut queues = self.queues.write().unwrap();
        let queue = queues
            .entry(agent_id.to_string())
            .or_insert_with(|| MessageQueue::new(agent_id, self.default_max_size));

        if let Some(evicted) = queue.push(message) {
            tracing::warn!(
                "Queue full for {}, evicted oldest message {}",
                agent_id,
                evicted.id
            );
        }
        true
    }

    /// The most recent `limit` messages for an agent, oldest-to-newest,
    /// without removing them.
    ///
    /// Expired-but-unswept messages are still returned; only the periodic
    /// sweep purges them.
    pub fn get_messages(&self, agent_id: &str, limit: usize) -> Vec<AgentMessage> {
        let queues = self.queues.read().unwrap();
        queues
            .get(agent_id)
            .map(|q| q.recent(limit))
            .unwrap_or_default()
    }

    /// Messages the agent has not yet marked read.
    pub fn get_unread_messages(&self, agent_id: &str) -> Vec<AgentMessage> {
        let queues = self.queues.read().unwrap();
        queues
            .get(agent_id)
            .map(|q| q.queue.iter().filter(|m| !m.is_read()).cloned().collect())
            .unwrap_or_default()
    }

    /// Mark a message read. Returns false when the message id is not found.
    pub fn mark_as_read(&self, agent_id: &str, message_id: &str) -> bool {
        let mut queues = self.queues.write().unwrap();
        let Some(queue) = queues.get_mut(agent_id) else {
            return false;
        };
        match queue.queue.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.mark_read();
                queue.last_processed = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Snapshot of an agent's queue.
    pub fn get_queue_status(&self, agent_id: &str) -> Option<MessageQueue> {
        let queues = self.queues.read().unwrap();
        queues.get(agent_id).cloned()
    }

    /// Drop every message in an agent's queue. Returns false when the agent
    /// has no queue.
    pub fn clear_queue(&self, agent_id: &str) -> bool {
        let mut queues = self.queues.write().unwrap();
        match queues.get_mut(agent_id) {
            Some(queue) => {
                queue.queue.clear();
                true
            }
            None => false,
        }
    }

    /// Agents with an existing queue. Broadcast resolves recipients from
    /// this set.
    pub fn known_agents(&self) -> Vec<String> {
        let queues = self.queues.read().unwrap();
        let mut agents: Vec<String> = queues.keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Total messages currently queued across all agents.
    pub fn queued_total(&self) -> usize {
        let queues = self.queues.read().unwrap();
        queues.values().map(|q| q.queue.len()).sum()
    }

    /// One expiry filter pass over every queue. Returns the number purged.
    ///
    /// The lock is taken per queue so producer pushes are never blocked for
    /// longer than a single filter pass.
    pub fn sweep_expired(&self) -> usize {
        let agents = self.known_agents();
        let mut purged = 0;
        for agent_id in agents {
            let mut queues = self.queues.write().unwrap();
            if let Some(queue) = queues.get_mut(&agent_id) {
                purged += queue.purge_expired();
            }
        }
        if purged > 0 {
            tracing::debug!("Sweep purged {} expired messages", purged);
        }
        purged
    }
}

impl Default for MessageQueueManager {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn msg(from: &str, to: &str) -> AgentMessage {
        AgentMessage::request(from, to, json!({}))
    }

    #[test]
    fn test_create_queue_idempotent() {
        let manager = MessageQueueManager::default();
        manager.create_queue("frontend");
        manager.add_message("frontend", msg("a", "frontend"));
        manager.create_queue("frontend");

        assert_eq!(manager.get_messages("frontend", 10).len(), 1);
    }

    #[test]
    fn test_bounded_eviction_keeps_newest() {
        let manager = MessageQueueManager::default();
        manager.create_queue_with_size("frontend", 2);

        let m1 = msg("a", "frontend");
        let m2 = msg("a", "frontend");
        let m3 = msg("a", "frontend");
        let (id2, id3) = (m2.id.clone(), m3.id.clone());

        manager.add_message("frontend", m1);
        manager.add_message("frontend", m2);
        manager.add_message("frontend", m3);

        let queued = manager.get_messages("frontend", 10);
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, id2);
        assert_eq!(queued[1].id, id3);
    }

    #[test]
    fn test_add_auto_creates_queue() {
        let manager = MessageQueueManager::default();
        assert!(manager.add_message("backend", msg("a", "backend")));
        assert_eq!(manager.known_agents(), vec!["backend".to_string()]);
    }

    #[test]
    fn test_get_messages_limit_preserves_order() {
        let manager = MessageQueueManager::default();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let m = msg("a", "b");
            ids.push(m.id.clone());
            manager.add_message("b", m);
        }

        let recent = manager.get_messages("b", 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, ids[2]);
        assert_eq!(recent[2].id, ids[4]);
    }

    #[test]
    fn test_mark_read_roundtrip() {
        let manager = MessageQueueManager::default();
        let m = msg("a", "b");
        let id = m.id.clone();
        manager.add_message("b", m);

        assert_eq!(manager.get_unread_messages("b").len(), 1);
        assert!(manager.mark_as_read("b", &id));
        assert!(manager.get_unread_messages("b").is_empty());
        // Read status does not remove from the queue.
        assert_eq!(manager.get_messages("b", 10).len(), 1);

        assert!(!manager.mark_as_read("b", "no-such-id"));
        assert!(!manager.mark_as_read("nobody", &id));
    }

    #[test]
    fn test_clear_queue() {
        let manager = MessageQueueManager::default();
        manager.add_message("b", msg("a", "b"));

        assert!(manager.clear_queue("b"));
        assert!(manager.get_messages("b", 10).is_empty());
        assert!(!manager.clear_queue("nobody"));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let manager = MessageQueueManager::default();
        let expired = msg("a", "b").with_expires_at(Utc::now() - Duration::seconds(1));
        let live = msg("a", "b");
        manager.add_message("b", expired);
        manager.add_message("b", live.clone());

        // Visible before the sweep; only the sweep purges.
        assert_eq!(manager.get_messages("b", 10).len(), 2);
        assert_eq!(manager.sweep_expired(), 1);

        let remaining = manager.get_messages("b", 10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);
    }

    #[test]
    fn test_queued_total() {
        let manager = MessageQueueManager::default();
        manager.add_message("a", msg("x", "a"));
        manager.add_message("b", msg("x", "b"));
        manager.add_message("b", msg("x", "b"));
        assert_eq!(manager.queued_total(), 3);
    }
}
