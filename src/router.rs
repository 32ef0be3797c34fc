//! Message routing across the three delivery topologies.
//!
//! Direct, broadcast, and channel routing all land on the same primitive:
//! push one independent copy of the message into each recipient's queue.
//! Participant resolution always completes before any queue write, so the
//! channel and queue managers are never locked together.

use std::sync::Arc;

use serde_json::Value;

use crate::channel::{ChannelManager, ChannelStatus};
use crate::error::{Error, Result};
use crate::protocol::{AgentMessage, BROADCAST_TARGET};
use crate::queue::MessageQueueManager;

/// Top-level dispatch: classifies a message's target and fans it out.
#[derive(Debug)]
pub struct MessageRouter {
    queues: Arc<MessageQueueManager>,
    channels: Arc<ChannelManager>,
}

impl MessageRouter {
    pub fn new(queues: Arc<MessageQueueManager>, channels: Arc<ChannelManager>) -> Self {
        Self { queues, channels }
    }

    /// Route a message to its recipient queue(s).
    ///
    /// Delivery is at-least-once per intended recipient; FIFO order holds
    /// within each recipient's queue relative to the order of calls.
    pub fn route_message(&self, message: &AgentMessage) -> Result<()> {
        if message.to_agent == BROADCAST_TARGET {
            self.route_broadcast(message)
        } else if let Some(channel_id) = message.channel_id() {
            self.route_channel(message, &channel_id.to_string())
        } else {
            self.route_direct(message)
        }
    }

    fn route_direct(&self, message: &AgentMessage) -> Result<()> {
        if !self.queues.add_message(&message.to_agent, message.clone()) {
            return Err(Error::Routing(format!(
                "Failed to deliver message to {}",
                message.to_agent
            )));
        }
        tracing::debug!(
            "Routed {} {} -> {}",
            message.message_type(),
            message.from_agent,
            message.to_agent
        );
        Ok(())
    }

    fn route_broadcast(&self, message: &AgentMessage) -> Result<()> {
        // Known agents are those with an existing queue; the sender never
        // receives its own broadcast.
        let recipients: Vec<String> = self
            .queues
            .known_agents()
            .into_iter()
            .filter(|a| a != &message.from_agent)
            .collect();

        for recipient in &recipients {
            let mut copy = message.clone();
            copy.to_agent = recipient.clone();
            copy.metadata
                .insert("broadcast".to_string(), Value::Bool(true));
            copy.metadata.insert(
                "original_target".to_string(),
                Value::String(BROADCAST_TARGET.to_string()),
            );
            self.queues.add_message(recipient, copy);
        }

        tracing::debug!(
            "Broadcast {} from {} to {} agents",
            message.message_type(),
            message.from_agent,
            recipients.len()
        );
        Ok(())
    }

    fn route_channel(&self, message: &AgentMessage, channel_id: &str) -> Result<()> {
        // Resolve first (short read), write per recipient after.
        let Some(channel) = self.channels.get_channel(channel_id) else {
            return Err(Error::Routing(format!(
                "Channel not found or empty: {}",
                channel_id
            )));
        };
        if channel.status != ChannelStatus::Active {
            return Err(Error::Routing(format!(
                "Channel {} is not active",
                channel_id
            )));
        }

        let participants = self
            .channels
            .get_channel_participants(channel_id, Some(&message.from_agent));
        if participants.is_empty() {
            return Err(Error::Routing(format!(
                "Channel not found or empty: {}",
                channel_id
            )));
        }

        for participant in &participants {
            let mut copy = message.clone();
            copy.to_agent = participant.clone();
            copy.metadata.insert(
                "channel_id".to_string(),
                Value::String(channel_id.to_string()),
            );
            copy.metadata.insert(
                "channel_name".to_string(),
                Value::String(channel.name.clone()),
            );
            self.queues.add_message(participant, copy);
        }

        self.channels
            .update_channel_activity(channel_id, participants.len() as u64);

        tracing::debug!(
            "Channel {} fan-out from {} to {} participants",
            channel_id,
            message.from_agent,
            participants.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::protocol::channel_target;
    use serde_json::json;

    fn setup() -> (Arc<MessageQueueManager>, Arc<ChannelManager>, MessageRouter) {
        let queues = Arc::new(MessageQueueManager::default());
        let channels = Arc::new(ChannelManager::new());
        let router = MessageRouter::new(queues.clone(), channels.clone());
        (queues, channels, router)
    }

    #[test]
    fn test_direct_delivery_isolated() {
        let (queues, _, router) = setup();
        queues.create_queue("frontend");
        queues.create_queue("backend");

        let msg = AgentMessage::request("architect", "frontend", json!({"task": "layout"}));
        router.route_message(&msg).unwrap();

        assert_eq!(queues.get_messages("frontend", 10).len(), 1);
        assert!(queues.get_messages("backend", 10).is_empty());
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let (queues, _, router) = setup();
        queues.create_queue("architect");
        queues.create_queue("frontend");
        queues.create_queue("backend");

        let msg = AgentMessage::notification("architect", BROADCAST_TARGET, "standup");
        router.route_message(&msg).unwrap();

        assert!(queues.get_messages("architect", 10).is_empty());
        for agent in ["frontend", "backend"] {
            let received = queues.get_messages(agent, 10);
            assert_eq!(received.len(), 1);
            let copy = &received[0];
            assert_eq!(copy.to_agent, agent);
            assert_eq!(copy.metadata.get("broadcast"), Some(&json!(true)));
            assert_eq!(
                copy.metadata.get("original_target"),
                Some(&json!("broadcast"))
            );
        }
    }

    #[test]
    fn test_channel_fanout_counts_and_tags() {
        let (queues, channels, router) = setup();
        let id = channels.create_channel(
            "pipeline-1",
            vec![
                "architect".to_string(),
                "frontend".to_string(),
                "backend".to_string(),
            ],
            ChannelKind::Multicast,
        );

        let msg = AgentMessage::notification("architect", channel_target(&id), "design ready");
        router.route_message(&msg).unwrap();

        assert!(queues.get_messages("architect", 10).is_empty());
        for agent in ["frontend", "backend"] {
            let received = queues.get_messages(agent, 10);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].metadata.get("channel_id"), Some(&json!(id)));
            assert_eq!(
                received[0].metadata.get("channel_name"),
                Some(&json!("pipeline-1"))
            );
        }
        assert_eq!(channels.get_channel(&id).unwrap().message_count, 2);
    }

    #[test]
    fn test_channel_missing_or_empty_errors() {
        let (_, channels, router) = setup();

        let msg = AgentMessage::notification("a", channel_target("nope"), "x");
        assert!(router.route_message(&msg).is_err());

        // Sender as sole participant leaves nobody to deliver to.
        let id = channels.create_channel("solo", vec!["a".to_string()], ChannelKind::Multicast);
        let msg = AgentMessage::notification("a", channel_target(&id), "x");
        let err = router.route_message(&msg).unwrap_err();
        assert!(err.to_string().contains("not found or empty"));
    }

    #[test]
    fn test_archived_channel_refuses_routing() {
        let (_, channels, router) = setup();
        let id = channels.create_channel(
            "old",
            vec!["a".to_string(), "b".to_string()],
            ChannelKind::Multicast,
        );
        channels.archive_channel(&id);

        let msg = AgentMessage::notification("a", channel_target(&id), "x");
        let err = router.route_message(&msg).unwrap_err();
        assert!(err.to_string().contains("not active"));
    }

    #[test]
    fn test_per_recipient_fifo() {
        let (queues, _, router) = setup();
        queues.create_queue("b");

        let first = AgentMessage::request("a", "b", json!({"n": 1}));
        let second = AgentMessage::request("a", "b", json!({"n": 2}));
        router.route_message(&first).unwrap();
        router.route_message(&second).unwrap();

        let received = queues.get_messages("b", 10);
        assert_eq!(received[0].id, first.id);
        assert_eq!(received[1].id, second.id);
    }
}
