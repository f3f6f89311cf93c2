//! Error types with fix suggestions
//!
//! Codes are stable and grouped by concern:
//! - GEX-01x: plan construction
//! - GEX-02x: graph resolution and snapshots
//! - GEX-03x: run gating
//! - GEX-04x: remote queue server

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum GroupExecError {
    #[error("Plan parse error: {0}")]
    PlanParse(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // Plan construction (GEX-010 to GEX-011)
    // ─────────────────────────────────────────────────────────────

    #[error("GEX-010: Invalid execution item #{index}: {reason}")]
    InvalidItem { index: usize, reason: String },

    #[error("GEX-011: No valid execution items (check group names and output nodes)")]
    EmptyPlan,

    // ─────────────────────────────────────────────────────────────
    // Resolution (GEX-020 to GEX-021)
    // ─────────────────────────────────────────────────────────────

    #[error("GEX-020: Group '{group}' not found")]
    GroupNotFound { group: String },

    #[error("GEX-021: Graph snapshot is empty, nothing to submit")]
    EmptySnapshot,

    // ─────────────────────────────────────────────────────────────
    // Run gating (GEX-030 to GEX-031)
    // ─────────────────────────────────────────────────────────────

    #[error("GEX-030: Executor '{node_id}' is already running")]
    AlreadyExecuting { node_id: String },

    #[error("GEX-031: Another execution is already in progress, wait for it to finish and retry")]
    GuardLocked,

    // ─────────────────────────────────────────────────────────────
    // Remote queue server (GEX-040 to GEX-045)
    // ─────────────────────────────────────────────────────────────

    #[error("GEX-040: Queue status query failed: {details}")]
    QueueQueryFailure { details: String },

    #[error("GEX-041: Server rejected submission ({status}): {body}")]
    SubmissionRejected { status: u16, body: String },

    #[error("GEX-042: Executing group '{group}' failed: {source}")]
    SubmissionFailure {
        group: String,
        source: Box<GroupExecError>,
    },

    #[error("GEX-043: Queue did not become idle within {waited_secs}s")]
    QueueWaitTimeout { waited_secs: u64 },

    #[error("GEX-044: Backend execution was not started: {message}")]
    DelegationRejected { message: String },

    #[error("GEX-045: Server did not accept the interrupt ({status}): {body}")]
    InterruptRejected { status: u16, body: String },
}

impl GroupExecError {
    /// Wrap an error with the group whose execution it aborted
    pub fn in_group(self, group: impl Into<String>) -> Self {
        GroupExecError::SubmissionFailure {
            group: group.into(),
            source: Box::new(self),
        }
    }

    /// True for rejections that leave run state untouched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GroupExecError::AlreadyExecuting { .. } | GroupExecError::GuardLocked
        )
    }
}

impl FixSuggestion for GroupExecError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            GroupExecError::PlanParse(_) => Some("Check plan syntax: a list of items or { items: [...] }"),
            GroupExecError::Json(_) => Some("Check that the file is valid JSON"),
            GroupExecError::Io(_) => Some("Check file path and permissions"),
            GroupExecError::Http(_) => Some("Check that the server is running and --server is correct"),
            GroupExecError::Config(_) => Some("Check the config file and GROUPEXEC_* environment variables"),
            GroupExecError::InvalidItem { .. } => {
                Some("Use repeat_count >= 1 and a finite, non-negative delay_seconds")
            }
            GroupExecError::EmptyPlan => {
                Some("Make sure each group exists and contains at least one output node")
            }
            GroupExecError::GroupNotFound { .. } => Some("Group names are matched by title, then by id"),
            GroupExecError::EmptySnapshot => Some("Export the API prompt with all nodes enabled"),
            GroupExecError::AlreadyExecuting { .. } | GroupExecError::GuardLocked => {
                Some("Wait for the current execution to finish, or interrupt it")
            }
            GroupExecError::QueueQueryFailure { .. } => Some("Check the server's /queue endpoint"),
            GroupExecError::SubmissionRejected { .. } => {
                Some("Inspect node_errors in the server response and fix the failing nodes")
            }
            GroupExecError::SubmissionFailure { source, .. } => source.fix_suggestion(),
            GroupExecError::QueueWaitTimeout { .. } => {
                Some("Raise max_queue_wait_secs or check for stuck jobs on the server")
            }
            GroupExecError::DelegationRejected { .. } => {
                Some("Check that the group executor extension is installed on the server")
            }
            GroupExecError::InterruptRejected { .. } => {
                Some("Local runs still stop; check the server's /interrupt endpoint to stop its current job")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_failure_names_group_and_cause() {
        let err = GroupExecError::SubmissionRejected {
            status: 400,
            body: "bad node".to_string(),
        }
        .in_group("Upscale");

        let msg = err.to_string();
        assert!(msg.contains("Upscale"));
        assert!(msg.contains("bad node"));
        assert_eq!(
            err.fix_suggestion(),
            Some("Inspect node_errors in the server response and fix the failing nodes")
        );
    }

    #[test]
    fn test_rejections() {
        assert!(GroupExecError::GuardLocked.is_rejection());
        assert!(GroupExecError::AlreadyExecuting { node_id: "7".into() }.is_rejection());
        assert!(!GroupExecError::EmptyPlan.is_rejection());
    }
}
