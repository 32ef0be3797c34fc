//! Default handoff protocols for the common pipeline stages.
//!
//! Kept as configuration data rather than code so new pipelines can be added
//! by shipping a different protocol file; `BusConfig` can layer more
//! protocols on top of these.

use crate::error::Result;

use super::protocol::HandoffProtocol;

const DEFAULT_PROTOCOLS_JSON: &str = r#"[
  {
    "from_agent": "architect",
    "to_agent": "frontend",
    "handoff_type": "architecture",
    "data_schema": {
      "components": "array",
      "styling": "object",
      "routing": "object",
      "state_management": "string"
    },
    "validation_rules": [
      "components.required.not_empty",
      "state_management.required.not_empty"
    ],
    "success_criteria": [
      "frontend can scaffold every listed component",
      "routing table covers all user-facing pages"
    ]
  },
  {
    "from_agent": "architect",
    "to_agent": "backend",
    "handoff_type": "architecture",
    "data_schema": {
      "api_design": "object",
      "database_schema": "object",
      "authentication": "object",
      "deployment": "object"
    },
    "validation_rules": [
      "api_design.required.not_empty",
      "database_schema.required.not_empty"
    ],
    "success_criteria": [
      "backend can implement endpoints without further design input"
    ]
  },
  {
    "from_agent": "frontend",
    "to_agent": "backend",
    "handoff_type": "implementation",
    "data_schema": {
      "endpoints": "array",
      "data_models": "array",
      "integration_notes": "string"
    },
    "validation_rules": [
      "endpoints.required.not_empty"
    ],
    "success_criteria": [
      "every consumed endpoint has an agreed contract"
    ]
  },
  {
    "from_agent": "backend",
    "to_agent": "devops",
    "handoff_type": "deployment",
    "data_schema": {
      "build_artifacts": "array",
      "environment": "string",
      "health_checks": "array"
    },
    "validation_rules": [
      "build_artifacts.required.not_empty",
      "environment.min_length(2)"
    ],
    "success_criteria": [
      "deployment can be rolled back from the listed artifacts"
    ],
    "rollback_procedure": "redeploy previous artifact set and replay health checks"
  }
]"#;

/// The preregistered protocols for the default agent pipeline.
pub fn default_protocols() -> Result<Vec<HandoffProtocol>> {
    Ok(serde_json::from_str(DEFAULT_PROTOCOLS_JSON)?)
}
