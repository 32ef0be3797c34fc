//! The bus facade: one entry point wiring the managers together.
//!
//! Callers construct an [`AgentMessage`], hand it to [`AgentBus::send_message`],
//! and the bus validates it, records it for statistics, and routes it.
//! Handoffs bypass the router: the handoff manager validates and records
//! them directly, and the bus then emits the handoff message into the
//! recipient's queue for audit visibility.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::audit::AuditSink;
use crate::channel::{ChannelKind, ChannelManager, ChannelStatus, CommunicationChannel};
use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::handoff::{HandoffManager, HandoffOutcome, HandoffProtocol, HandoffType};
use crate::protocol::{validate_message, AgentMessage, MessagePayload, Priority};
use crate::queue::{MessageQueue, MessageQueueManager};
use crate::router::MessageRouter;
use crate::stats::{AgentSummary, CommunicationStats, StatisticsManager};
use crate::sweep::SweepDaemon;

/// In-process message bus for cooperating agents.
pub struct AgentBus {
    config: BusConfig,
    queues: Arc<MessageQueueManager>,
    channels: Arc<ChannelManager>,
    handoffs: HandoffManager,
    stats: StatisticsManager,
    router: MessageRouter,
}

impl AgentBus {
    /// Build a bus from configuration and an audit sink.
    ///
    /// Default handoff protocols are preregistered; `config.protocols_file`
    /// may layer more on top (replacing on triple conflicts).
    pub fn new(config: BusConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let queues = Arc::new(MessageQueueManager::new(config.default_queue_size));
        let channels = Arc::new(ChannelManager::new());
        let router = MessageRouter::new(queues.clone(), channels.clone());
        let handoffs = HandoffManager::with_default_protocols(audit)?;
        for protocol in config.load_extra_protocols()? {
            handoffs.register_protocol(protocol);
        }
        let stats = StatisticsManager::new(config.history_cap);

        Ok(Self {
            config,
            queues,
            channels,
            handoffs,
            stats,
            router,
        })
    }

    // ---- messaging ----

    /// Validate, record, and route a message. Returns the message id.
    pub fn send_message(&self, message: AgentMessage) -> Result<String> {
        validate_message(&message)?;
        self.stats.record(&message);
        self.router.route_message(&message)?;
        Ok(message.id)
    }

    /// Respond to a request: endpoints flipped, correlation id and priority
    /// carried over, payload wrapping the outcome.
    pub fn send_response(
        &self,
        original: &AgentMessage,
        success: bool,
        data: Value,
    ) -> Result<String> {
        let mut response = AgentMessage::with_payload_of(
            original.to_agent.clone(),
            original.from_agent.clone(),
            MessagePayload::Response {
                success: Some(success),
                data,
                original_request_id: Some(original.id.clone()),
            },
        )
        .with_priority(original.priority);
        if let Some(corr) = &original.correlation_id {
            response = response.with_correlation_id(corr.clone());
        }
        self.send_message(response)
    }

    /// Send a notification to every channel participant except the sender.
    /// Returns one message id per recipient.
    pub fn broadcast_to_channel(
        &self,
        channel_id: &str,
        from_agent: &str,
        body: impl Into<String>,
        priority: Priority,
    ) -> Result<Vec<String>> {
        let Some(channel) = self.channels.get_channel(channel_id) else {
            return Err(Error::Routing(format!("Channel not found: {}", channel_id)));
        };
        if channel.status != ChannelStatus::Active {
            return Err(Error::Routing(format!(
                "Channel {} is not active",
                channel_id
            )));
        }
        let participants = self
            .channels
            .get_channel_participants(channel_id, Some(from_agent));
        if participants.is_empty() {
            return Err(Error::Routing(format!(
                "Channel not found or empty: {}",
                channel_id
            )));
        }

        let body = body.into();
        let mut ids = Vec::with_capacity(participants.len());
        for participant in &participants {
            let message = AgentMessage::notification(from_agent, participant.clone(), body.clone())
                .with_priority(priority)
                .with_metadata("channel_id", Value::String(channel_id.to_string()))
                .with_metadata("channel_name", Value::String(channel.name.clone()));
            ids.push(self.send_message(message)?);
        }
        self.channels
            .update_channel_activity(channel_id, ids.len() as u64);
        Ok(ids)
    }

    // ---- handoffs ----

    pub fn register_protocol(&self, protocol: HandoffProtocol) {
        self.handoffs.register_protocol(protocol);
    }

    /// Perform a schema-validated handoff and emit its record to the
    /// recipient's queue.
    pub async fn perform_handoff(
        &self,
        from_agent: &str,
        to_agent: &str,
        handoff_type: HandoffType,
        data: serde_json::Map<String, Value>,
    ) -> Result<HandoffOutcome> {
        let outcome = self
            .handoffs
            .perform_handoff(from_agent, to_agent, handoff_type, data)
            .await?;

        self.stats.record(&outcome.message);
        self.queues.add_message(to_agent, outcome.message.clone());
        Ok(outcome)
    }

    // ---- queues ----

    pub fn create_queue(&self, agent_id: &str) {
        self.queues.create_queue(agent_id);
    }

    pub fn get_messages(&self, agent_id: &str, limit: usize) -> Vec<AgentMessage> {
        self.queues.get_messages(agent_id, limit)
    }

    pub fn get_unread_messages(&self, agent_id: &str) -> Vec<AgentMessage> {
        self.queues.get_unread_messages(agent_id)
    }

    pub fn mark_as_read(&self, agent_id: &str, message_id: &str) -> bool {
        self.queues.mark_as_read(agent_id, message_id)
    }

    pub fn get_queue_status(&self, agent_id: &str) -> Option<MessageQueue> {
        self.queues.get_queue_status(agent_id)
    }

    pub fn clear_queue(&self, agent_id: &str) -> bool {
        self.queues.clear_queue(agent_id)
    }

    // ---- channels ----

    pub fn create_channel(
        &self,
        name: impl Into<String>,
        participants: Vec<String>,
        kind: ChannelKind,
    ) -> String {
        self.channels.create_channel(name, participants, kind)
    }

    pub fn add_participant(&self, channel_id: &str, agent_id: &str) -> bool {
        self.channels.add_participant(channel_id, agent_id)
    }

    pub fn remove_participant(&self, channel_id: &str, agent_id: &str) -> bool {
        self.channels.remove_participant(channel_id, agent_id)
    }

    pub fn archive_channel(&self, channel_id: &str) -> bool {
        self.channels.archive_channel(channel_id)
    }

    pub fn delete_channel(&self, channel_id: &str) -> bool {
        self.channels.delete_channel(channel_id)
    }

    pub fn get_channel(&self, channel_id: &str) -> Option<CommunicationChannel> {
        self.channels.get_channel(channel_id)
    }

    pub fn get_channels_for_agent(&self, agent_id: &str) -> Vec<CommunicationChannel> {
        self.channels.get_channels_for_agent(agent_id)
    }

    // ---- statistics ----

    /// Aggregate stats with live channel and queue numbers filled in.
    pub fn communication_stats(&self) -> CommunicationStats {
        let mut stats = self.stats.communication_stats();
        stats.active_channels = self.channels.active_channels().len();
        stats.queued_messages = self.queues.queued_total();
        stats
    }

    /// Per-agent summary with live queue and channel numbers filled in.
    pub fn agent_summary(&self, agent_id: &str) -> AgentSummary {
        let mut summary = self.stats.agent_summary(agent_id);
        summary.queue_size = self
            .queues
            .get_queue_status(agent_id)
            .map_or(0, |q| q.queue.len());
        summary.unread_messages = self.queues.get_unread_messages(agent_id).len();
        summary.active_channels = self.channels.get_channels_for_agent(agent_id).len();
        summary
    }

    pub fn message_history(&self, limit: usize) -> Vec<AgentMessage> {
        self.stats.message_history(limit)
    }

    // ---- maintenance ----

    /// Spawn the expiry sweep on the current tokio runtime. The returned
    /// daemon handle stops the loop; the join handle resolves once it has.
    pub fn spawn_sweeper(&self) -> (Arc<SweepDaemon>, JoinHandle<Result<()>>) {
        let daemon = Arc::new(SweepDaemon::new(
            self.queues.clone(),
            self.config.sweep_interval(),
        ));
        let task = {
            let daemon = daemon.clone();
            tokio::spawn(async move { daemon.start().await })
        };
        (daemon, task)
    }

    /// One immediate sweep pass, mainly for tests and shutdown paths.
    pub fn sweep_now(&self) -> usize {
        self.queues.sweep_expired()
    }
}

impl std::fmt::Debug for AgentBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBus")
            .field("queued_messages", &self.queues.queued_total())
            .field("protocols", &self.handoffs.protocol_count())
            .finish()
    }
}
