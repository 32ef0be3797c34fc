//! Named multi-party communication channels.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::channel_target;

/// Channel topology.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Direct,
    Broadcast,
    Multicast,
    Pipeline,
}

impl Default for ChannelKind {
    fn default() -> Self {
        Self::Multicast
    }
}

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Active,
    Inactive,
    /// Soft-deleted: still queryable, refuses new participants and traffic.
    Archived,
}

/// A named group of agents supporting multicast delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationChannel {
    pub id: String,
    pub name: String,
    /// Ordered, duplicate-free
    pub participants: Vec<String>,
    pub kind: ChannelKind,
    pub status: ChannelStatus,
    pub created_at: DateTime<Utc>,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
}

impl CommunicationChannel {
    /// The routing target addressing this channel (`channel:<id>`).
    pub fn target(&self) -> String {
        channel_target(&self.id)
    }
}

/// Owns all channels; mutation happens only through its operations.
#[derive(Debug, Default)]
pub struct ChannelManager {
    channels: RwLock<HashMap<String, CommunicationChannel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel and return its id. Duplicate participants are
    /// dropped, first occurrence wins.
    pub fn create_channel(
        &self,
        name: impl Into<String>,
        participants: Vec<String>,
        kind: ChannelKind,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut deduped: Vec<String> = Vec::with_capacity(participants.len());
        for agent in participants {
            if !deduped.contains(&agent) {
                deduped.push(agent);
            }
        }

        let channel = CommunicationChannel {
            id: id.clone(),
            name: name.into(),
            participants: deduped,
            kind,
            status: ChannelStatus::Active,
            created_at: now,
            message_count: 0,
            last_activity: now,
        };

        let mut channels = self.channels.write().unwrap();
        tracing::debug!("Created channel {} ({})", channel.name, id);
        channels.insert(id.clone(), channel);
        id
    }

    /// Add an agent to a channel. Idempotent; refused for archived channels
    /// and unknown ids.
    pub fn add_participant(&self, channel_id: &str, agent_id: &str) -> bool {
        let mut channels = self.channels.write().unwrap();
        let Some(channel) = channels.get_mut(channel_id) else {
            return false;
        };
        if channel.status == ChannelStatus::Archived {
            tracing::warn!(
                "Refusing to add {} to archived channel {}",
                agent_id,
                channel_id
            );
            return false;
        }
        if !channel.participants.iter().any(|p| p == agent_id) {
            channel.participants.push(agent_id.to_string());
        }
        channel.last_activity = Utc::now();
        true
    }

    /// Remove an agent from a channel. No-op when the agent is absent.
    pub fn remove_participant(&self, channel_id: &str, agent_id: &str) -> bool {
        let mut channels = self.channels.write().unwrap();
        let Some(channel) = channels.get_mut(channel_id) else {
            return false;
        };
        channel.participants.retain(|p| p != agent_id);
        channel.last_activity = Utc::now();
        true
    }

    /// Bump the message counter and activity timestamp after a fan-out.
    pub fn update_channel_activity(&self, channel_id: &str, message_count_delta: u64) -> bool {
        let mut channels = self.channels.write().unwrap();
        let Some(channel) = channels.get_mut(channel_id) else {
            return false;
        };
        channel.message_count += message_count_delta;
        channel.last_activity = Utc::now();
        true
    }

    /// Soft-delete a channel. It stays queryable but stops routing.
    pub fn archive_channel(&self, channel_id: &str) -> bool {
        let mut channels = self.channels.write().unwrap();
        match channels.get_mut(channel_id) {
            Some(channel) => {
                channel.status = ChannelStatus::Archived;
                channel.last_activity = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Hard-delete a channel.
    pub fn delete_channel(&self, channel_id: &str) -> bool {
        let mut channels = self.channels.write().unwrap();
        channels.remove(channel_id).is_some()
    }

    /// Snapshot of a channel, regardless of status.
    pub fn get_channel(&self, channel_id: &str) -> Option<CommunicationChannel> {
        let channels = self.channels.read().unwrap();
        channels.get(channel_id).cloned()
    }

    /// Defensive copy of a channel's participants, optionally excluding one
    /// agent (used to avoid echoing a message back to its sender).
    pub fn get_channel_participants(
        &self,
        channel_id: &str,
        exclude_agent: Option<&str>,
    ) -> Vec<String> {
        let channels = self.channels.read().unwrap();
        channels
            .get(channel_id)
            .map(|c| {
                c.participants
                    .iter()
                    .filter(|p| exclude_agent != Some(p.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active channels containing an agent.
    pub fn get_channels_for_agent(&self, agent_id: &str) -> Vec<CommunicationChannel> {
        let channels = self.channels.read().unwrap();
        channels
            .values()
            .filter(|c| {
                c.status == ChannelStatus::Active
                    && c.participants.iter().any(|p| p == agent_id)
            })
            .cloned()
            .collect()
    }

    /// All active channels.
    pub fn active_channels(&self) -> Vec<CommunicationChannel> {
        let channels = self.channels.read().unwrap();
        channels
            .values()
            .filter(|c| c.status == ChannelStatus::Active)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_dedupes_participants() {
        let manager = ChannelManager::new();
        let id = manager.create_channel(
            "pipeline",
            agents(&["architect", "frontend", "architect"]),
            ChannelKind::Multicast,
        );

        let channel = manager.get_channel(&id).unwrap();
        assert_eq!(channel.participants, agents(&["architect", "frontend"]));
        assert_eq!(channel.status, ChannelStatus::Active);
        assert_eq!(channel.message_count, 0);
    }

    #[test]
    fn test_add_participant_idempotent() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a"]), ChannelKind::Multicast);

        assert!(manager.add_participant(&id, "b"));
        assert!(manager.add_participant(&id, "b"));
        assert_eq!(
            manager.get_channel(&id).unwrap().participants,
            agents(&["a", "b"])
        );
        assert!(!manager.add_participant("missing", "b"));
    }

    #[test]
    fn test_remove_participant() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a", "b"]), ChannelKind::Multicast);

        assert!(manager.remove_participant(&id, "a"));
        // Removing an absent agent is a no-op, not an error.
        assert!(manager.remove_participant(&id, "zzz"));
        assert_eq!(manager.get_channel(&id).unwrap().participants, agents(&["b"]));
    }

    #[test]
    fn test_archived_refuses_participants_but_stays_queryable() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a"]), ChannelKind::Pipeline);

        assert!(manager.archive_channel(&id));
        assert!(!manager.add_participant(&id, "b"));

        let channel = manager.get_channel(&id).unwrap();
        assert_eq!(channel.status, ChannelStatus::Archived);
        assert_eq!(manager.get_channel_participants(&id, None), agents(&["a"]));
    }

    #[test]
    fn test_participants_exclusion() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a", "b", "c"]), ChannelKind::Multicast);

        assert_eq!(
            manager.get_channel_participants(&id, Some("b")),
            agents(&["a", "c"])
        );
        assert!(manager.get_channel_participants("missing", None).is_empty());
    }

    #[test]
    fn test_channels_for_agent_active_only() {
        let manager = ChannelManager::new();
        let active = manager.create_channel("one", agents(&["a", "b"]), ChannelKind::Multicast);
        let archived = manager.create_channel("two", agents(&["a"]), ChannelKind::Multicast);
        manager.archive_channel(&archived);

        let found = manager.get_channels_for_agent("a");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, active);
        assert!(manager.get_channels_for_agent("nobody").is_empty());
    }

    #[test]
    fn test_activity_counter() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a"]), ChannelKind::Multicast);

        assert!(manager.update_channel_activity(&id, 2));
        assert!(manager.update_channel_activity(&id, 1));
        assert_eq!(manager.get_channel(&id).unwrap().message_count, 3);
    }

    #[test]
    fn test_delete_channel() {
        let manager = ChannelManager::new();
        let id = manager.create_channel("c", agents(&["a"]), ChannelKind::Multicast);

        assert!(manager.delete_channel(&id));
        assert!(manager.get_channel(&id).is_none());
        assert!(!manager.delete_channel(&id));
    }
}
