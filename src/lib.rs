//! agentwire library root.

pub mod audit;
pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod handoff;
pub mod logging;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod stats;
pub mod sweep;

pub use audit::{AuditSink, FileAuditSink, NoopAuditSink};
pub use bus::AgentBus;
pub use channel::{ChannelKind, ChannelManager, ChannelStatus, CommunicationChannel};
pub use config::BusConfig;
pub use error::{Error, Result};
pub use handoff::{HandoffManager, HandoffOutcome, HandoffProtocol, HandoffType};
pub use protocol::{AgentMessage, MessagePayload, MessageType, Priority};
pub use queue::{MessageQueue, MessageQueueManager};
pub use router::MessageRouter;
pub use stats::{AgentSummary, CommunicationStats, StatisticsManager};
pub use sweep::SweepDaemon;
