//! Handoff execution: protocol registry, validation, audit trail.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::audit::AuditSink;
use crate::error::{Error, Result};
use crate::protocol::validate::validate_handoff_data;
use crate::protocol::{AgentMessage, MessagePayload, Priority};

use super::defaults::default_protocols;
use super::protocol::{HandoffProtocol, HandoffType};

type ProtocolKey = (String, String, HandoffType);

/// Result of a successful handoff.
#[derive(Debug, Clone)]
pub struct HandoffOutcome {
    /// ID of the handoff message produced for audit visibility.
    pub handoff_id: String,
    /// The handoff-typed message; the bus routes it to the recipient.
    pub message: AgentMessage,
    /// Whether the audit-store write succeeded. A false here never fails
    /// the handoff itself.
    pub audit_recorded: bool,
}

/// Owns the protocol registry and executes handoffs against it.
pub struct HandoffManager {
    protocols: RwLock<HashMap<ProtocolKey, HandoffProtocol>>,
    audit: Arc<dyn AuditSink>,
}

impl HandoffManager {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            protocols: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Create a manager preloaded with the default pipeline protocols.
    pub fn with_default_protocols(audit: Arc<dyn AuditSink>) -> Result<Self> {
        let manager = Self::new(audit);
        for protocol in default_protocols()? {
            manager.register_protocol(protocol);
        }
        Ok(manager)
    }

    /// Register a protocol, replacing any prior protocol for the same
    /// (from, to, type) triple.
    pub fn register_protocol(&self, protocol: HandoffProtocol) {
        let mut protocols = self.protocols.write().unwrap();
        let label = protocol.key_label();
        if protocols.insert(protocol.key(), protocol).is_some() {
            tracing::debug!("Replaced handoff protocol {}", label);
        } else {
            tracing::debug!("Registered handoff protocol {}", label);
        }
    }

    /// Look up a registered protocol.
    pub fn get_protocol(
        &self,
        from_agent: &str,
        to_agent: &str,
        handoff_type: HandoffType,
    ) -> Option<HandoffProtocol> {
        let protocols = self.protocols.read().unwrap();
        protocols
            .get(&(from_agent.to_string(), to_agent.to_string(), handoff_type))
            .cloned()
    }

    pub fn protocol_count(&self) -> usize {
        self.protocols.read().unwrap().len()
    }

    /// Validate and record a handoff between two agents.
    ///
    /// Validation failures return before any side effect. The audit-store
    /// write happens outside every lock and its failure is logged, never
    /// propagated: the handoff's correctness is independent of audit-log
    /// durability.
    pub async fn perform_handoff(
        &self,
        from_agent: &str,
        to_agent: &str,
        handoff_type: HandoffType,
        data: serde_json::Map<String, Value>,
    ) -> Result<HandoffOutcome> {
        let protocol = self
            .get_protocol(from_agent, to_agent, handoff_type)
            .ok_or_else(|| {
                Error::Handoff(format!(
                    "No handoff protocol found for {} -> {} ({})",
                    from_agent, to_agent, handoff_type
                ))
            })?;

        validate_handoff_data(&data, &protocol)?;

        let message = AgentMessage::with_payload_of(
            from_agent,
            to_agent,
            MessagePayload::Handoff {
                handoff_type,
                data: data.clone(),
                protocol_key: protocol.key_label(),
                validation_passed: true,
            },
        )
        .with_priority(Priority::High);

        let audit_recorded = self.write_audit_trail(&message, &protocol, &data).await;

        tracing::info!(
            "Handoff recorded: {} -> {} ({})",
            from_agent,
            to_agent,
            handoff_type
        );

        Ok(HandoffOutcome {
            handoff_id: message.id.clone(),
            message,
            audit_recorded,
        })
    }

    async fn write_audit_trail(
        &self,
        message: &AgentMessage,
        protocol: &HandoffProtocol,
        data: &serde_json::Map<String, Value>,
    ) -> bool {
        let entity = format!("handoff:{}", message.id);
        let observations = vec![
            format!("from: {}", message.from_agent),
            format!("to: {}", message.to_agent),
            format!("type: {}", protocol.handoff_type),
            format!("at: {}", message.timestamp.to_rfc3339()),
            format!("fields: {}", data.keys().cloned().collect::<Vec<_>>().join(", ")),
        ];

        if let Err(e) = self
            .audit
            .create_entity(&entity, "agent_handoff", observations)
            .await
        {
            tracing::warn!("Handoff audit write failed for {}: {}", entity, e);
            return false;
        }

        // Running log per agent pair; created lazily on first handoff.
        let pipeline = format!("pipeline:{}", protocol.key_label());
        let line = format!("{} {}", message.timestamp.to_rfc3339(), message.id);
        if self
            .audit
            .append_observations(&pipeline, vec![line.clone()])
            .await
            .is_err()
        {
            if let Err(e) = self
                .audit
                .create_entity(&pipeline, "agent_pipeline", vec![line])
                .await
            {
                tracing::warn!("Pipeline audit write failed for {}: {}", pipeline, e);
                return false;
            }
        }

        true
    }
}

impl std::fmt::Debug for HandoffManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffManager")
            .field("protocols", &self.protocol_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::protocol::MessageType;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; optionally fails every one of them.
    struct ProbeSink {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ProbeSink {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuditSink for ProbeSink {
        async fn create_entity(&self, _: &str, _: &str, _: Vec<String>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Audit("store unavailable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn append_observations(&self, _: &str, _: Vec<String>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Audit("store unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn frontend_data() -> serde_json::Map<String, Value> {
        json!({
            "components": ["Header", "Dashboard"],
            "styling": {"framework": "tailwind"},
            "routing": {"/": "Dashboard"},
            "state_management": "zustand"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn test_handoff_success() {
        let manager =
            HandoffManager::with_default_protocols(Arc::new(NoopAuditSink)).unwrap();

        let outcome = manager
            .perform_handoff("architect", "frontend", HandoffType::Architecture, frontend_data())
            .await
            .unwrap();

        assert!(outcome.audit_recorded);
        assert_eq!(outcome.message.message_type(), MessageType::Handoff);
        assert_eq!(outcome.message.priority, Priority::High);
        match &outcome.message.payload {
            MessagePayload::Handoff {
                validation_passed,
                protocol_key,
                ..
            } => {
                assert!(*validation_passed);
                assert_eq!(protocol_key, "architect->frontend:architecture");
            }
            other => panic!("expected handoff payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_protocol_fails_fast() {
        let probe = Arc::new(ProbeSink::new(false));
        let manager = HandoffManager::new(probe.clone());

        let err = manager
            .perform_handoff("devops", "architect", HandoffType::Validation, frontend_data())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No handoff protocol found"));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_performs_no_audit_write() {
        let probe = Arc::new(ProbeSink::new(false));
        let manager = HandoffManager::with_default_protocols(probe.clone()).unwrap();

        let mut data = frontend_data();
        data.remove("state_management");

        let err = manager
            .perform_handoff("architect", "frontend", HandoffType::Architecture, data)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_handoff() {
        let probe = Arc::new(ProbeSink::new(true));
        let manager = HandoffManager::with_default_protocols(probe.clone()).unwrap();

        let outcome = manager
            .perform_handoff("architect", "frontend", HandoffType::Architecture, frontend_data())
            .await
            .unwrap();

        assert!(!outcome.audit_recorded);
        assert!(probe.calls() > 0);
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let manager =
            HandoffManager::with_default_protocols(Arc::new(NoopAuditSink)).unwrap();
        let count = manager.protocol_count();

        let mut replacement = manager
            .get_protocol("architect", "frontend", HandoffType::Architecture)
            .unwrap();
        replacement.data_schema.clear();
        replacement.validation_rules.clear();
        manager.register_protocol(replacement);

        assert_eq!(manager.protocol_count(), count);
        // Replacement protocol accepts what the default refused.
        let outcome = manager
            .perform_handoff(
                "architect",
                "frontend",
                HandoffType::Architecture,
                serde_json::Map::new(),
            )
            .await;
        assert!(outcome.is_ok());
    }
}
