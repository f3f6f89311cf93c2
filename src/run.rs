//! Orchestration run state
//!
//! An [`OrchestrationRun`] is owned by the caller and lent to the
//! orchestrator for the duration of one invocation. It can be reused: every
//! exit path resets it to [`RunPhase::Idle`].
//!
//! While the orchestrator holds the run, cancellation goes through a
//! [`CancelHandle`] taken beforehand.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::event_log::EventLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Enriching,
    Executing,
    Delaying,
    Delegating,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Enriching => "enriching",
            RunPhase::Executing => "executing",
            RunPhase::Delaying => "delaying",
            RunPhase::Delegating => "delegating",
            RunPhase::Completed => "completed",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { total_tasks: u32 },
    Cancelled { completed_tasks: u32, total_tasks: u32 },
    /// The server accepted the plan and runs it on its own
    Delegated { items: usize, message: String },
}

#[derive(Debug, Default)]
struct CancelState {
    armed: bool,
    token: CancellationToken,
}

/// Cloneable cancel switch for an [`OrchestrationRun`]
///
/// One handle serves every run of the same `OrchestrationRun`. Cancelling
/// while no run is executing does nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<Mutex<CancelState>>,
}

impl CancelHandle {
    /// Request cancellation of the executing run; false when idle
    pub fn cancel(&self) -> bool {
        let state = self.state.lock();
        if state.armed {
            state.token.cancel();
        }
        state.armed
    }

    pub fn is_cancelled(&self) -> bool {
        let state = self.state.lock();
        state.armed && state.token.is_cancelled()
    }

    /// Fresh token for a run that is starting
    fn arm(&self) -> CancellationToken {
        let mut state = self.state.lock();
        state.armed = true;
        state.token = CancellationToken::new();
        state.token.clone()
    }

    fn disarm(&self) {
        self.state.lock().armed = false;
    }
}

#[derive(Debug, Default)]
pub struct OrchestrationRun {
    is_executing: bool,
    cancel: CancelHandle,
    current_task: u32,
    total_tasks: u32,
    status_text: String,
    phase: RunPhase,
    events: EventLog,
}

impl OrchestrationRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run as executing with fresh counters and an empty event log
    ///
    /// Returns the token the run's checkpoints observe.
    pub(crate) fn begin(&mut self, phase: RunPhase) -> CancellationToken {
        self.is_executing = true;
        self.current_task = 0;
        self.total_tasks = 0;
        self.status_text.clear();
        self.phase = phase;
        self.events.clear();
        self.cancel.arm()
    }

    /// Back to idle; the event log stays readable until the next run begins
    pub(crate) fn reset(&mut self) {
        self.is_executing = false;
        self.current_task = 0;
        self.total_tasks = 0;
        self.status_text.clear();
        self.phase = RunPhase::Idle;
        self.cancel.disarm();
    }

    /// Handle that cancels this run and every later run of it
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing
    }

    pub fn is_cancelling(&self) -> bool {
        self.is_executing && self.cancel.is_cancelled()
    }

    pub fn current_task(&self) -> u32 {
        self.current_task
    }

    pub fn total_tasks(&self) -> u32 {
        self.total_tasks
    }

    /// Percentage of tasks started, in `0.0..=100.0`
    pub fn progress(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            f64::from(self.current_task) / f64::from(self.total_tasks) * 100.0
        }
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub(crate) fn set_total_tasks(&mut self, total: u32) {
        self.total_tasks = total;
    }

    /// Advance to the next task, returns its 1-based number
    pub(crate) fn next_task(&mut self) -> u32 {
        self.current_task += 1;
        self.current_task
    }

    pub(crate) fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    pub(crate) fn set_status(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_ignored_while_idle() {
        let run = OrchestrationRun::new();
        let handle = run.cancel_handle();
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
        assert!(!run.is_cancelling());
    }

    #[test]
    fn test_handle_outlives_a_cancelled_run() {
        let mut run = OrchestrationRun::new();
        let handle = run.cancel_handle();

        let first = run.begin(RunPhase::Enriching);
        assert!(handle.cancel());
        assert!(first.is_cancelled());
        assert!(run.is_cancelling());

        run.reset();
        assert!(!run.is_cancelling());
        assert!(!handle.cancel());

        let second = run.begin(RunPhase::Enriching);
        assert!(!second.is_cancelled());
        assert!(handle.cancel());
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_begin_clears_previous_events() {
        let mut run = OrchestrationRun::new();
        run.begin(RunPhase::Executing);
        run.events().emit(crate::event_log::EventKind::RunCancelled {
            current_task: 0,
            total_tasks: 1,
        });
        run.reset();
        assert_eq!(run.events().len(), 1);

        run.begin(RunPhase::Executing);
        assert!(run.events().is_empty());
    }

    #[test]
    fn test_progress() {
        let mut run = OrchestrationRun::new();
        assert_eq!(run.progress(), 0.0);

        run.begin(RunPhase::Executing);
        run.set_total_tasks(4);
        assert_eq!(run.next_task(), 1);
        assert_eq!(run.progress(), 25.0);

        run.reset();
        assert_eq!(run.phase(), RunPhase::Idle);
        assert_eq!(run.current_task(), 0);
        assert_eq!(run.status_text(), "");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::Delaying.to_string(), "delaying");
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::Executing.is_terminal());
    }
}
