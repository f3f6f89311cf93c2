//! Queue poller
//!
//! The remote queue only exposes its occupancy, so "the job finished" is
//! observed as "nothing is running or pending". A failed status query counts
//! as busy: resolving idle on a transient error would let the next
//! submission overlap the current job.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::{QueueBackend, QueueStatus};
use crate::error::GroupExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    /// Pause between status queries
    pub interval: Duration,
    /// Extra wait after idle is first observed
    pub settle_delay: Duration,
    /// Give up after this long; `None` waits forever
    pub max_wait: Option<Duration>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(300),
            settle_delay: Duration::from_millis(200),
            max_wait: None,
        }
    }
}

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Idle,
    Cancelled,
}

pub struct QueuePoller {
    backend: Arc<dyn QueueBackend>,
    settings: PollerSettings,
}

impl QueuePoller {
    pub fn new(backend: Arc<dyn QueueBackend>, settings: PollerSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Status with query failures mapped to busy
    pub async fn status(&self) -> QueueStatus {
        match self.backend.queue_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Queue status query failed, assuming busy");
                QueueStatus::assumed_busy()
            }
        }
    }

    /// Poll until the queue is idle or `is_cancelled` reports true
    ///
    /// Idle resolves only after the settle delay. `is_cancelled` is asked
    /// once per cycle, before the query; a query or pause already underway
    /// always runs to completion.
    pub async fn wait_for_idle<F>(&self, mut is_cancelled: F) -> Result<WaitOutcome, GroupExecError>
    where
        F: FnMut() -> bool,
    {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            if is_cancelled() {
                debug!(polls, "Queue wait cancelled");
                return Ok(WaitOutcome::Cancelled);
            }

            let status = self.status().await;
            polls += 1;

            if status.is_idle() {
                tokio::time::sleep(self.settings.settle_delay).await;
                debug!(polls, waited_ms = started.elapsed().as_millis() as u64, "Queue idle");
                return Ok(WaitOutcome::Idle);
            }

            if let Some(max_wait) = self.settings.max_wait {
                if started.elapsed() >= max_wait {
                    return Err(GroupExecError::QueueWaitTimeout {
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            debug!(
                running = status.running_count,
                pending = status.pending_count,
                "Queue busy"
            );

            tokio::time::sleep(self.settings.interval).await;
        }
    }
}
