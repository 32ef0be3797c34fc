//! Bus configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handoff::HandoffProtocol;

fn default_queue_size() -> usize {
    1000
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_history_cap() -> usize {
    10_000
}

/// Tunables for an [`AgentBus`](crate::bus::AgentBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-agent queue capacity; overflow evicts the oldest entry.
    #[serde(default = "default_queue_size")]
    pub default_queue_size: usize,

    /// Period of the expiry sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Statistics history cap; overflow evicts the oldest half.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Base directory for the file audit sink, when one is used.
    #[serde(default)]
    pub audit_dir: Option<PathBuf>,

    /// Extra handoff protocols layered over the built-in defaults.
    #[serde(default)]
    pub protocols_file: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_queue_size: default_queue_size(),
            sweep_interval_secs: default_sweep_interval_secs(),
            history_cap: default_history_cap(),
            audit_dir: None,
            protocols_file: None,
        }
    }
}

impl BusConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        tracing::debug!("Loaded bus config from {}", path.display());
        Ok(config)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Protocols from `protocols_file`, empty when none is configured.
    /// Unparseable rule expressions in the file fail the load.
    pub fn load_extra_protocols(&self) -> Result<Vec<HandoffProtocol>> {
        let Some(path) = &self.protocols_file else {
            return Ok(Vec::new());
        };
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
