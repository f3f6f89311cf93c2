//! HTTP client for the queue server
//!
//! Every `/prompt` submission passes through the closure interceptor, so a
//! user-originated whole-graph submission containing sender nodes is reduced
//! to what those senders need.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use tracing::{debug, error, warn};
use url::Url;

use super::{BackendAck, BackendRequest, QueueBackend, QueueSnapshot, QueueStatus};
use crate::closure::intercept;
use crate::config::ExecutorConfig;
use crate::error::GroupExecError;
use crate::graph::NodeCatalog;
use crate::prompt::{PromptAccepted, PromptSubmission};

/// Characters of an error body kept in delegation errors
const ERROR_BODY_LIMIT: usize = 200;

const USER_AGENT: &str = concat!("groupexec/", env!("CARGO_PKG_VERSION"));

pub struct HttpQueueClient {
    client: reqwest::Client,
    base: Url,
    client_id: String,
    sender_class: String,
    backend_endpoint: String,
}

impl HttpQueueClient {
    pub fn new(config: &ExecutorConfig) -> Result<Self, GroupExecError> {
        let mut base = config.server_url()?;
        // Keep any path prefix when joining endpoint paths
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base,
            client_id: config.client_id(),
            sender_class: config.sender_class.clone(),
            backend_endpoint: config.backend_endpoint.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn endpoint(&self, path: &str) -> Result<Url, GroupExecError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| GroupExecError::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }

    async fn rejection(response: Response) -> GroupExecError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        GroupExecError::SubmissionRejected { status, body }
    }
}

#[async_trait]
impl QueueBackend for HttpQueueClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, submission: PromptSubmission) -> Result<PromptAccepted, GroupExecError> {
        let mut submission = intercept(submission, &self.sender_class);
        if submission.client_id.is_none() {
            submission.client_id = Some(self.client_id.clone());
        }

        debug!(
            nodes = submission.prompt.len(),
            tagged = submission.is_tagged(),
            "Submitting prompt"
        );

        let response = self
            .client
            .post(self.endpoint("prompt")?)
            .json(&submission)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            error!(error = %err, "Prompt submission rejected");
            return Err(err);
        }

        let accepted: PromptAccepted = response.json().await?;
        debug!(prompt_id = %accepted.prompt_id, "Prompt accepted");
        Ok(accepted)
    }

    async fn queue_status(&self) -> Result<QueueStatus, GroupExecError> {
        let query_failure = |details: String| GroupExecError::QueueQueryFailure { details };

        let response = self
            .client
            .get(self.endpoint("queue")?)
            .send()
            .await
            .map_err(|e| query_failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(query_failure(format!("HTTP {}", response.status())));
        }

        let snapshot: QueueSnapshot = response
            .json()
            .await
            .map_err(|e| query_failure(e.to_string()))?;
        Ok(snapshot.into())
    }

    async fn interrupt(&self) -> Result<(), GroupExecError> {
        let response = self
            .client
            .post(self.endpoint("interrupt")?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(status, "Interrupt request not accepted");
            let body = response.text().await.unwrap_or_default();
            return Err(GroupExecError::InterruptRejected { status, body });
        }
        Ok(())
    }

    async fn delegate(&self, request: &BackendRequest) -> Result<BackendAck, GroupExecError> {
        let response = self
            .client
            .post(self.endpoint(&self.backend_endpoint)?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            let message = if status == StatusCode::CONFLICT {
                format!("server is already executing a plan (HTTP 409): {}", excerpt)
            } else {
                format!("HTTP {}: {}", status.as_u16(), excerpt)
            };
            return Err(GroupExecError::DelegationRejected { message });
        }

        let ack: BackendAck = response.json().await?;
        if !ack.is_success() {
            return Err(GroupExecError::DelegationRejected {
                message: if ack.message.is_empty() {
                    format!("status '{}'", ack.status)
                } else {
                    ack.message
                },
            });
        }
        Ok(ack)
    }

    async fn object_info(&self) -> Result<NodeCatalog, GroupExecError> {
        let response = self
            .client
            .get(self.endpoint("object_info")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
