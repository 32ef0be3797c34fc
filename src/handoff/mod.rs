//! Schema-validated work handoffs between agent pairs.
//!
//! A handoff protocol declares, per (from, to, type) triple, the data
//! schema and rules a work-product transfer must satisfy. Handoffs do not
//! go through the router's topologies; the manager validates and records
//! them directly, then emits a handoff-typed message for audit visibility.

pub mod defaults;
pub mod manager;
pub mod protocol;

pub use defaults::default_protocols;
pub use manager::{HandoffManager, HandoffOutcome};
pub use protocol::{FieldType, HandoffProtocol, HandoffType, ValidationRule};
