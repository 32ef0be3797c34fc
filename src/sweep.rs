//! Periodic expiry sweep over all agent queues.
//!
//! The sweep is the only mechanism that purges expired messages; readers
//! may observe an expired-but-not-yet-swept message between ticks. Tests
//! drive [`SweepDaemon::run_once`] directly instead of waiting on timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::queue::MessageQueueManager;

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Recurring timer task filtering expired messages out of every queue.
pub struct SweepDaemon {
    queues: Arc<MessageQueueManager>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl SweepDaemon {
    pub fn new(queues: Arc<MessageQueueManager>, interval: Duration) -> Self {
        Self {
            queues,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// One sweep pass over every queue. Returns the number purged.
    pub fn run_once(&self) -> usize {
        self.queues.sweep_expired()
    }

    /// Run the sweep loop until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if *running {
                return Err(Error::Other("Sweep daemon already running".to_string()));
            }
            *running = true;
        }

        tracing::info!("Sweep daemon started ({:?} interval)", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                tracing::info!("Sweep daemon stopping");
                break;
            }
            self.run_once();
        }

        Ok(())
    }

    /// Signal the loop to exit after its current tick.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
