//! Handoff protocol definitions: data schemas and validation rules.

use std::collections::HashMap;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::Error;

/// Pipeline stage a handoff belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandoffType {
    Architecture,
    Implementation,
    Validation,
    Deployment,
}

impl std::fmt::Display for HandoffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HandoffType::Architecture => "architecture",
            HandoffType::Implementation => "implementation",
            HandoffType::Validation => "validation",
            HandoffType::Deployment => "deployment",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for HandoffType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "architecture" => Ok(HandoffType::Architecture),
            "implementation" => Ok(HandoffType::Implementation),
            "validation" => Ok(HandoffType::Validation),
            "deployment" => Ok(HandoffType::Deployment),
            other => Err(Error::Handoff(format!("Unknown handoff type: {}", other))),
        }
    }
}

/// Expected primitive type of a schema field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Whether a runtime JSON value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        write!(f, "{}", s)
    }
}

/// A validation rule applied to handoff data.
///
/// Rules are written in the expression grammar `field.required.not_empty`,
/// `field.min_length(N)`, `field.max_length(N)` and parsed once at protocol
/// registration. Unrecognized expressions are rejected there, never silently
/// skipped at evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRule {
    /// Field must be present and non-empty.
    Required { field: String },
    /// Field length (string chars, array items) must be at least `min`.
    MinLength { field: String, min: usize },
    /// Field length must be at most `max`.
    MaxLength { field: String, max: usize },
}

impl ValidationRule {
    /// Parse a rule expression.
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let pattern = |p: &str| {
            Regex::new(p).map_err(|e| Error::Validation(format!("Bad rule pattern: {}", e)))
        };
        let required = pattern(r"^(\w+)\.required\.not_empty$")?;
        let min_length = pattern(r"^(\w+)\.min_length\((\d+)\)$")?;
        let max_length = pattern(r"^(\w+)\.max_length\((\d+)\)$")?;

        if let Some(caps) = required.captures(expr) {
            return Ok(ValidationRule::Required {
                field: caps[1].to_string(),
            });
        }
        if let Some(caps) = min_length.captures(expr) {
            let min = caps[2]
                .parse()
                .map_err(|_| Error::Validation(format!("Bad length in rule: {}", expr)))?;
            return Ok(ValidationRule::MinLength {
                field: caps[1].to_string(),
                min,
            });
        }
        if let Some(caps) = max_length.captures(expr) {
            let max = caps[2]
                .parse()
                .map_err(|_| Error::Validation(format!("Bad length in rule: {}", expr)))?;
            return Ok(ValidationRule::MaxLength {
                field: caps[1].to_string(),
                max,
            });
        }

        Err(Error::Validation(format!(
            "Unrecognized rule expression: {}",
            expr
        )))
    }

    /// The field this rule constrains.
    pub fn field(&self) -> &str {
        match self {
            ValidationRule::Required { field }
            | ValidationRule::MinLength { field, .. }
            | ValidationRule::MaxLength { field, .. } => field,
        }
    }

    /// Evaluate the rule against a data record. Returns an explanation on
    /// failure.
    pub fn evaluate(&self, data: &serde_json::Map<String, Value>) -> Result<(), String> {
        let value = match data.get(self.field()) {
            Some(v) => v,
            None => return Err(format!("field '{}' is missing", self.field())),
        };

        match self {
            ValidationRule::Required { field } => {
                let empty = match value {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Array(a) => a.is_empty(),
                    Value::Object(o) => o.is_empty(),
                    _ => false,
                };
                if empty {
                    Err(format!("field '{}' is empty", field))
                } else {
                    Ok(())
                }
            }
            ValidationRule::MinLength { field, min } => {
                let len = value_length(value)
                    .ok_or_else(|| format!("field '{}' has no length", field))?;
                if len < *min {
                    Err(format!("field '{}' length {} < {}", field, len, min))
                } else {
                    Ok(())
                }
            }
            ValidationRule::MaxLength { field, max } => {
                let len = value_length(value)
                    .ok_or_else(|| format!("field '{}' has no length", field))?;
                if len > *max {
                    Err(format!("field '{}' length {} > {}", field, len, max))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

impl std::fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationRule::Required { field } => write!(f, "{}.required.not_empty", field),
            ValidationRule::MinLength { field, min } => {
                write!(f, "{}.min_length({})", field, min)
            }
            ValidationRule::MaxLength { field, max } => {
                write!(f, "{}.max_length({})", field, max)
            }
        }
    }
}

// Rules serialize as their source expression so protocol files stay in the
// grammar operators actually write. Parsing at deserialization is what
// rejects unknown expressions before they can reach evaluation.
impl Serialize for ValidationRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ValidationRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let expr = String::deserialize(deserializer)?;
        ValidationRule::parse(&expr).map_err(serde::de::Error::custom)
    }
}

/// A registered handoff protocol between a pair of agents.
///
/// Identity is the `(from_agent, to_agent, handoff_type)` triple;
/// re-registering the same triple replaces the prior protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffProtocol {
    pub from_agent: String,
    pub to_agent: String,
    pub handoff_type: HandoffType,
    /// Field name → expected primitive type
    pub data_schema: HashMap<String, FieldType>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    /// Advisory; not enforced programmatically
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_procedure: Option<String>,
}

impl HandoffProtocol {
    /// The registry key for this protocol.
    pub fn key(&self) -> (String, String, HandoffType) {
        (
            self.from_agent.clone(),
            self.to_agent.clone(),
            self.handoff_type,
        )
    }

    /// Human-readable protocol identifier, embedded in handoff messages and
    /// audit records.
    pub fn key_label(&self) -> String {
        format!(
            "{}->{}:{}",
            self.from_agent, self.to_agent, self.handoff_type
        )
    }
}
