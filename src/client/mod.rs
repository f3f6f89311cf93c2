//! # Queue Server Clients
//!
//! The orchestrator talks to the remote queue through the [`QueueBackend`]
//! trait:
//!
//! - [`HttpQueueClient`] - production client over HTTP
//! - [`MockQueue`] - in-memory queue with scripted behavior for tests
//!
//! ## Endpoints
//!
//! | Operation | Route |
//! |-----------|-------|
//! | submit | `POST /prompt` |
//! | queue status | `GET /queue` |
//! | interrupt | `POST /interrupt` |
//! | delegate | `POST /ccx_group_executor/execute_backend` |
//! | node catalog | `GET /object_info` |

mod http;
mod mock;

pub use http::HttpQueueClient;
pub use mock::{MockQueue, RecordedSubmission};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GroupExecError;
use crate::graph::NodeCatalog;
use crate::plan::EnrichedExecutionItem;
use crate::prompt::{Prompt, PromptAccepted, PromptSubmission};

// ============================================================================
// QUEUE STATUS
// ============================================================================

/// Occupancy of the remote queue
///
/// The flags always agree with the counts; build through [`QueueStatus::from_counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStatus {
    pub is_running: bool,
    pub is_pending: bool,
    pub running_count: usize,
    pub pending_count: usize,
}

impl QueueStatus {
    pub fn from_counts(running_count: usize, pending_count: usize) -> Self {
        Self {
            is_running: running_count > 0,
            is_pending: pending_count > 0,
            running_count,
            pending_count,
        }
    }

    /// Status assumed when the server cannot be queried
    pub fn assumed_busy() -> Self {
        Self::from_counts(1, 0)
    }

    pub fn idle() -> Self {
        Self::from_counts(0, 0)
    }

    pub fn is_idle(&self) -> bool {
        !self.is_running && !self.is_pending
    }
}

/// Response of `GET /queue`; only the list lengths matter
#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<Value>,
    #[serde(default)]
    pub queue_pending: Vec<Value>,
}

impl From<QueueSnapshot> for QueueStatus {
    fn from(snapshot: QueueSnapshot) -> Self {
        QueueStatus::from_counts(snapshot.queue_running.len(), snapshot.queue_pending.len())
    }
}

// ============================================================================
// DELEGATION
// ============================================================================

/// Body of the backend delegation request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub node_id: String,
    pub execution_list: Vec<EnrichedExecutionItem>,
    pub api_prompt: Prompt,
}

/// Server acknowledgement of a delegated plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAck {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl BackendAck {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Operations the orchestrator needs from a queue server
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Enqueue a prompt
    async fn submit(&self, submission: PromptSubmission) -> Result<PromptAccepted, GroupExecError>;

    /// Current queue occupancy
    async fn queue_status(&self) -> Result<QueueStatus, GroupExecError>;

    /// Ask the server to stop the running job
    async fn interrupt(&self) -> Result<(), GroupExecError>;

    /// Hand a whole plan to the server; `Ok` only when it was accepted
    async fn delegate(&self, request: &BackendRequest) -> Result<BackendAck, GroupExecError>;

    /// Node class metadata
    async fn object_info(&self) -> Result<NodeCatalog, GroupExecError>;
}
