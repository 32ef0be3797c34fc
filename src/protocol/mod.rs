//! Inter-agent communication protocol.
//!
//! Defines the message shapes exchanged between agents and the pure
//! validation functions applied before routing.

pub mod message;
pub mod validate;

pub use message::{
    channel_target, AgentMessage, MessagePayload, MessageType, Priority, BROADCAST_TARGET,
    CHANNEL_PREFIX,
};
pub use validate::{validate_handoff_data, validate_message};
