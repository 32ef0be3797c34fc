//! Pure validation of messages and handoff payloads.

use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::handoff::HandoffProtocol;

use super::message::AgentMessage;

/// Validate a message's structural correctness before routing.
///
/// Type and priority ranges are enforced by construction; what remains is
/// the presence of both endpoints and a sane expiry.
pub fn validate_message(message: &AgentMessage) -> Result<()> {
    if message.from_agent.trim().is_empty() {
        return Err(Error::Validation("from_agent is required".to_string()));
    }
    if message.to_agent.trim().is_empty() {
        return Err(Error::Validation("to_agent is required".to_string()));
    }
    if let Some(expires_at) = message.expires_at {
        if expires_at <= Utc::now() {
            return Err(Error::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate handoff data against a protocol's schema and rules.
///
/// Checks every schema key for presence and runtime type, then evaluates
/// each registered rule in order. The first failure wins.
pub fn validate_handoff_data(
    data: &serde_json::Map<String, Value>,
    protocol: &HandoffProtocol,
) -> Result<()> {
    for (field, expected) in &protocol.data_schema {
        match data.get(field) {
            None => {
                return Err(Error::Validation(format!(
                    "Missing required field: {}",
                    field
                )));
            }
            Some(value) if !expected.matches(value) => {
                return Err(Error::Validation(format!(
                    "Field '{}' has wrong type, expected {}",
                    field, expected
                )));
            }
            Some(_) => {}
        }
    }

    for rule in &protocol.validation_rules {
        if let Err(reason) = rule.evaluate(data) {
            return Err(Error::Validation(format!(
                "Rule '{}' failed: {}",
                rule, reason
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{FieldType, HandoffType, ValidationRule};
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashMap;

    fn test_protocol() -> HandoffProtocol {
        let mut schema = HashMap::new();
        schema.insert("components".to_string(), FieldType::Array);
        schema.insert("state_management".to_string(), FieldType::String);

        HandoffProtocol {
            from_agent: "architect".to_string(),
            to_agent: "frontend".to_string(),
            handoff_type: HandoffType::Architecture,
            data_schema: schema,
            validation_rules: vec![ValidationRule::parse("components.required.not_empty").unwrap()],
            success_criteria: vec!["frontend can start implementation".to_string()],
            rollback_procedure: None,
        }
    }

    fn record(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_message() {
        let msg = AgentMessage::request("a", "b", json!({}));
        assert!(validate_message(&msg).is_ok());
    }

    #[test]
    fn test_missing_endpoints() {
        let msg = AgentMessage::request("", "b", json!({}));
        assert!(validate_message(&msg).is_err());

        let msg = AgentMessage::request("a", "  ", json!({}));
        assert!(validate_message(&msg).is_err());
    }

    #[test]
    fn test_past_expiry_rejected() {
        let msg = AgentMessage::request("a", "b", json!({}))
            .with_expires_at(Utc::now() - Duration::seconds(10));
        assert!(validate_message(&msg).is_err());
    }

    #[test]
    fn test_handoff_data_conforming() {
        let data = record(json!({
            "components": ["Header", "Sidebar"],
            "state_management": "zustand"
        }));
        assert!(validate_handoff_data(&data, &test_protocol()).is_ok());
    }

    #[test]
    fn test_handoff_data_missing_field() {
        let data = record(json!({"components": ["Header"]}));
        let err = validate_handoff_data(&data, &test_protocol()).unwrap_err();
        assert!(err.to_string().contains("state_management"));
    }

    #[test]
    fn test_handoff_data_wrong_type() {
        let data = record(json!({
            "components": "not an array",
            "state_management": "zustand"
        }));
        let err = validate_handoff_data(&data, &test_protocol()).unwrap_err();
        assert!(err.to_string().contains("wrong type"));
    }

    #[test]
    fn test_handoff_data_rule_failure() {
        let data = record(json!({
            "components": [],
            "state_management": "zustand"
        }));
        let err = validate_handoff_data(&data, &test_protocol()).unwrap_err();
        assert!(err.to_string().contains("components"));
    }
}
