//! Passive statistics over observed message traffic.
//!
//! The manager keeps a capped append-only history and derives aggregates on
//! demand; it observes every message but never gates delivery.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{AgentMessage, MessagePayload, MessageType, Priority};

/// History cap; exceeding it evicts the oldest half in one batch.
pub const HISTORY_CAP: usize = 10_000;

/// Aggregate communication metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationStats {
    pub total_messages: usize,
    pub by_type: HashMap<MessageType, usize>,
    pub by_priority: HashMap<Priority, usize>,
    /// Mean latency over request/response pairs matched by correlation id,
    /// counting only responses strictly after their request. None when no
    /// pair exists.
    pub average_response_time_ms: Option<f64>,
    /// Share of response messages whose payload `success` flag is not
    /// explicitly false. An absent flag counts as success, so the rate is
    /// optimistic for senders that never set the flag.
    pub success_rate: Option<f64>,
    /// Live count, filled in by the bus facade.
    pub active_channels: usize,
    /// Live count, filled in by the bus facade.
    pub queued_messages: usize,
}

impl std::fmt::Display for CommunicationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Communication Stats:")?;
        writeln!(f, "  Total:    {}", self.total_messages)?;
        writeln!(f, "  Queued:   {}", self.queued_messages)?;
        writeln!(f, "  Channels: {}", self.active_channels)?;
        match self.average_response_time_ms {
            Some(ms) => writeln!(f, "  Avg response: {:.1}ms", ms)?,
            None => writeln!(f, "  Avg response: n/a")?,
        }
        match self.success_rate {
            Some(rate) => write!(f, "  Success rate: {:.1}%", rate * 100.0),
            None => write!(f, "  Success rate: n/a"),
        }
    }
}

/// Per-agent traffic summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub messages_sent: usize,
    pub messages_received: usize,
    pub sent_by_type: HashMap<MessageType, usize>,
    pub received_by_type: HashMap<MessageType, usize>,
    pub last_activity: Option<DateTime<Utc>>,
    /// Live number, filled in by the bus facade.
    pub queue_size: usize,
    /// Live number, filled in by the bus facade.
    pub unread_messages: usize,
    /// Live number, filled in by the bus facade.
    pub active_channels: usize,
}

/// Owns the message history and derives metrics from it.
#[derive(Debug)]
pub struct StatisticsManager {
    history: RwLock<Vec<AgentMessage>>,
    cap: usize,
}

impl StatisticsManager {
    pub fn new(cap: usize) -> Self {
        Self {
            history: RwLock::new(Vec::new()),
            cap,
        }
    }

    /// Append a message to the history, batch-evicting the oldest half when
    /// the cap is exceeded.
    pub fn record(&self, message: &AgentMessage) {
        let mut history = self.history.write().unwrap();
        history.push(message.clone());
        if history.len() > self.cap {
            let drop = history.len() / 2;
            history.drain(0..drop);
            tracing::debug!("Statistics history evicted {} oldest entries", drop);
        }
    }

    /// Number of messages currently held in history.
    pub fn history_len(&self) -> usize {
        self.history.read().unwrap().len()
    }

    /// The most recent `limit` recorded messages, oldest-to-newest.
    pub fn message_history(&self, limit: usize) -> Vec<AgentMessage> {
        let history = self.history.read().unwrap();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Derive aggregate metrics from the history.
    pub fn communication_stats(&self) -> CommunicationStats {
        let history = self.history.read().unwrap();

        let mut by_type: HashMap<MessageType, usize> = HashMap::new();
        let mut by_priority: HashMap<Priority, usize> = HashMap::new();
        for message in history.iter() {
            *by_type.entry(message.message_type()).or_insert(0) += 1;
            *by_priority.entry(message.priority).or_insert(0) += 1;
        }

        // First request per correlation id wins as the pair's start.
        let mut request_times: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for message in history.iter() {
            if message.message_type() == MessageType::Request {
                if let Some(corr) = message.correlation_id.as_deref() {
                    request_times.entry(corr).or_insert(message.timestamp);
                }
            }
        }

        let mut latency_total_ms: i64 = 0;
        let mut pairs = 0usize;
        let mut responses = 0usize;
        let mut successes = 0usize;
        for message in history.iter() {
            if let MessagePayload::Response { success, .. } = &message.payload {
                responses += 1;
                if *success != Some(false) {
                    successes += 1;
                }
                if let Some(corr) = message.correlation_id.as_deref() {
                    if let Some(requested_at) = request_times.get(corr) {
                        if message.timestamp > *requested_at {
                            latency_total_ms +=
                                (message.timestamp - *requested_at).num_milliseconds();
                            pairs += 1;
                        }
                    }
                }
            }
        }

        CommunicationStats {
            total_messages: history.len(),
            by_type,
            by_priority,
            average_response_time_ms: (pairs > 0)
                .then(|| latency_total_ms as f64 / pairs as f64),
            success_rate: (responses > 0).then(|| successes as f64 / responses as f64),
            active_channels: 0,
            queued_messages: 0,
        }
    }

    /// Per-agent summary, scanning history for the agent in either role.
    pub fn agent_summary(&self, agent_id: &str) -> AgentSummary {
        let history = self.history.read().unwrap();

        let mut summary = AgentSummary {
            agent_id: agent_id.to_string(),
            messages_sent: 0,
            messages_received: 0,
            sent_by_type: HashMap::new(),
            received_by_type: HashMap::new(),
            last_activity: None,
            queue_size: 0,
            unread_messages: 0,
            active_channels: 0,
        };

        for message in history.iter() {
            let mut touched = false;
            if message.from_agent == agent_id {
                summary.messages_sent += 1;
                *summary.sent_by_type.entry(message.message_type()).or_insert(0) += 1;
                touched = true;
            }
            if message.to_agent == agent_id {
                summary.messages_received += 1;
                *summary
                    .received_by_type
                    .entry(message.message_type())
                    .or_insert(0) += 1;
                touched = true;
            }
            if touched {
                summary.last_activity = Some(
                    summary
                        .last_activity
                        .map_or(message.timestamp, |t| t.max(message.timestamp)),
                );
            }
        }

        summary
    }
}

impl Default for StatisticsManager {
    fn default() -> Self {
        Self::new(HISTORY_CAP)
    }
}
