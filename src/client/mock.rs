//! Mock queue for testing
//!
//! Records every call and reports a configurable number of busy polls after
//! each submission, without any network traffic.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{BackendAck, BackendRequest, QueueBackend, QueueStatus};
use crate::error::GroupExecError;
use crate::graph::NodeCatalog;
use crate::prompt::{PromptAccepted, PromptSubmission};

/// Called with the 1-based submission number before it is accepted
type SubmitHook = Arc<dyn Fn(usize) + Send + Sync>;

/// A submission as received by the mock
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub submission: PromptSubmission,
    /// Tokio clock reading at submission (deterministic under paused time)
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    submissions: Vec<RecordedSubmission>,
    delegations: Vec<BackendRequest>,
    status_queries: usize,
    interrupts: usize,
    busy_remaining: usize,
}

/// In-memory queue server
#[derive(Clone)]
pub struct MockQueue {
    state: Arc<Mutex<MockState>>,
    /// Busy polls reported after each submission before going idle
    busy_polls: usize,
    fail_status: bool,
    fail_submission_at: Option<usize>,
    delegate_ack: BackendAck,
    catalog: NodeCatalog,
    on_submit: Option<SubmitHook>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            busy_polls: 0,
            fail_status: false,
            fail_submission_at: None,
            delegate_ack: BackendAck::success("started"),
            catalog: NodeCatalog::new(),
            on_submit: None,
        }
    }

    pub fn with_busy_polls(mut self, polls: usize) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Every status query fails
    pub fn with_failing_status(mut self) -> Self {
        self.fail_status = true;
        self
    }

    /// Reject the n-th submission (1-based) with HTTP 500
    pub fn with_failing_submission(mut self, n: usize) -> Self {
        self.fail_submission_at = Some(n);
        self
    }

    pub fn with_delegate_ack(mut self, ack: BackendAck) -> Self {
        self.delegate_ack = ack;
        self
    }

    pub fn with_catalog(mut self, catalog: NodeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn on_submit<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_submit = Some(Arc::new(hook));
        self
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    pub fn delegations(&self) -> Vec<BackendRequest> {
        self.state.lock().delegations.clone()
    }

    pub fn status_queries(&self) -> usize {
        self.state.lock().status_queries
    }

    pub fn interrupts(&self) -> usize {
        self.state.lock().interrupts
    }
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MockQueue {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, submission: PromptSubmission) -> Result<PromptAccepted, GroupExecError> {
        let number = {
            let mut state = self.state.lock();
            state.submissions.push(RecordedSubmission {
                submission,
                at: Instant::now(),
            });
            state.busy_remaining = self.busy_polls;
            state.submissions.len()
        };

        if let Some(hook) = &self.on_submit {
            hook(number);
        }

        if self.fail_submission_at == Some(number) {
            return Err(GroupExecError::SubmissionRejected {
                status: 500,
                body: "mock submission failure".to_string(),
            });
        }

        Ok(PromptAccepted {
            prompt_id: format!("mock-{}", number),
            number: Some(number as i64),
            node_errors: serde_json::json!({}),
        })
    }

    async fn queue_status(&self) -> Result<QueueStatus, GroupExecError> {
        let mut state = self.state.lock();
        state.status_queries += 1;

        if self.fail_status {
            return Err(GroupExecError::QueueQueryFailure {
                details: "mock status failure".to_string(),
            });
        }

        if state.busy_remaining > 0 {
            state.busy_remaining -= 1;
            Ok(QueueStatus::from_counts(1, 0))
        } else {
            Ok(QueueStatus::idle())
        }
    }

    async fn interrupt(&self) -> Result<(), GroupExecError> {
        self.state.lock().interrupts += 1;
        Ok(())
    }

    async fn delegate(&self, request: &BackendRequest) -> Result<BackendAck, GroupExecError> {
        self.state.lock().delegations.push(request.clone());
        if self.delegate_ack.is_success() {
            Ok(self.delegate_ack.clone())
        } else {
            Err(GroupExecError::DelegationRejected {
                message: self.delegate_ack.message.clone(),
            })
        }
    }

    async fn object_info(&self) -> Result<NodeCatalog, GroupExecError> {
        Ok(self.catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Prompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_mock_busy_then_idle() {
        let queue = MockQueue::new().with_busy_polls(2);
        queue.submit(PromptSubmission::new(Prompt::new())).await.unwrap();

        assert!(!queue.queue_status().await.unwrap().is_idle());
        assert!(!queue.queue_status().await.unwrap().is_idle());
        assert!(queue.queue_status().await.unwrap().is_idle());
        assert_eq!(queue.status_queries(), 3);
    }

    #[tokio::test]
    async fn test_mock_failures_and_hook() {
        let seen = Arc::new(AtomicUsize::new(0));
        let hook_seen = seen.clone();
        let queue = MockQueue::new()
            .with_failing_submission(2)
            .with_failing_status()
            .on_submit(move |n| hook_seen.store(n, Ordering::SeqCst));

        let first = queue.submit(PromptSubmission::new(Prompt::new())).await.unwrap();
        assert_eq!(first.prompt_id, "mock-1");
        assert!(queue.submit(PromptSubmission::new(Prompt::new())).await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(queue.submission_count(), 2);
        assert!(queue.queue_status().await.is_err());
    }
}
