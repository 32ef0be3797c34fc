//! Message types for agent communication.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handoff::HandoffType;

/// Literal target marking a message for every known agent except the sender.
pub const BROADCAST_TARGET: &str = "broadcast";

/// Target prefix addressing a channel, as in `channel:<id>`.
pub const CHANNEL_PREFIX: &str = "channel:";

/// Message type classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Request expecting a response
    Request,
    /// Response to a request
    Response,
    /// Status update, no response expected
    Notification,
    /// Validated work-product transfer between pipeline stages
    Handoff,
    /// Error report
    Error,
    /// Liveness signal
    Heartbeat,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notification => "notification",
            MessageType::Handoff => "handoff",
            MessageType::Error => "error",
            MessageType::Heartbeat => "heartbeat",
        };
        write!(f, "{}", s)
    }
}

/// Message priority levels.
///
/// Informative only: queues stay FIFO regardless of priority. The ordering
/// lets consumers decide their own read order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
    Urgent = 3,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        write!(f, "{}", s)
    }
}

/// Message payload, one variant per message type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Request {
        data: Value,
    },
    Response {
        /// Absent counts as success when deriving the success rate.
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_request_id: Option<String>,
    },
    Notification {
        body: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
    Handoff {
        handoff_type: HandoffType,
        data: serde_json::Map<String, Value>,
        protocol_key: String,
        validation_passed: bool,
    },
    Error {
        message: String,
    },
    Heartbeat,
}

impl MessagePayload {
    /// The message type this payload variant belongs to.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Request { .. } => MessageType::Request,
            MessagePayload::Response { .. } => MessageType::Response,
            MessagePayload::Notification { .. } => MessageType::Notification,
            MessagePayload::Handoff { .. } => MessageType::Handoff,
            MessagePayload::Error { .. } => MessageType::Error,
            MessagePayload::Heartbeat => MessageType::Heartbeat,
        }
    }
}

/// A unit of communication between two agents.
///
/// Each queued copy is an independent value with its own `metadata`, so
/// read-tracking on one recipient's copy never leaks to another's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message ID (ULID)
    pub id: String,
    /// Sender agent ID
    pub from_agent: String,
    /// Recipient: an agent ID, `broadcast`, or `channel:<id>`
    pub to_agent: String,
    /// Priority level
    pub priority: Priority,
    /// Typed payload
    pub payload: MessagePayload,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Links a response back to its originating request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Expiration instant; enforced lazily by the sweep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Delivery retry counter, maintained by callers
    #[serde(default)]
    pub retry_count: u32,
    /// Open key/value bag: read-tracking and routing provenance tags
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentMessage {
    fn base(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        priority: Priority,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            priority,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            expires_at: None,
            retry_count: 0,
            metadata: HashMap::new(),
        }
    }

    /// Create a request message.
    pub fn request(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        data: Value,
    ) -> Self {
        Self::base(
            from_agent,
            to_agent,
            Priority::High,
            MessagePayload::Request { data },
        )
    }

    /// Create a response message.
    pub fn response(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        success: bool,
        data: Value,
    ) -> Self {
        Self::base(
            from_agent,
            to_agent,
            Priority::Medium,
            MessagePayload::Response {
                success: Some(success),
                data,
                original_request_id: None,
            },
        )
    }

    /// Create a notification message.
    pub fn notification(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::base(
            from_agent,
            to_agent,
            Priority::Medium,
            MessagePayload::Notification {
                body: body.into(),
                data: Value::Null,
            },
        )
    }

    /// Create an error message.
    pub fn error(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::base(
            from_agent,
            to_agent,
            Priority::High,
            MessagePayload::Error {
                message: message.into(),
            },
        )
    }

    /// Create a heartbeat message.
    pub fn heartbeat(from_agent: impl Into<String>, to_agent: impl Into<String>) -> Self {
        Self::base(
            from_agent,
            to_agent,
            Priority::Low,
            MessagePayload::Heartbeat,
        )
    }

    /// Create a message from an arbitrary payload.
    pub fn with_payload_of(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self::base(from_agent, to_agent, Priority::default(), payload)
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the correlation ID.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the expiration to `ttl` from now.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(Utc::now() + ttl);
        self
    }

    /// Set an explicit expiration instant.
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The message type, derived from the payload variant.
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Whether the expiration instant has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Utc::now() > at)
    }

    /// Whether the recipient has marked this copy read.
    pub fn is_read(&self) -> bool {
        self.metadata.get("read").map_or(false, |v| v == &Value::Bool(true))
    }

    /// Mark this copy read, recording the read instant.
    pub fn mark_read(&mut self) {
        self.metadata.insert("read".to_string(), Value::Bool(true));
        self.metadata
            .insert("read_at".to_string(), Value::String(Utc::now().to_rfc3339()));
    }

    /// Whether the target addresses a channel.
    pub fn is_channel_target(&self) -> bool {
        self.to_agent.starts_with(CHANNEL_PREFIX)
    }

    /// The channel ID when the target addresses one.
    pub fn channel_id(&self) -> Option<&str> {
        self.to_agent.strip_prefix(CHANNEL_PREFIX)
    }
}

/// Format an agent message target addressing a channel.
pub fn channel_target(channel_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, channel_id)
}
