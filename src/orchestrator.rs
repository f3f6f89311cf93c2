//! # Group Execution Orchestrator
//!
//! Runs a plan against the remote queue, one submission at a time:
//!
//! ```text
//! for item in enriched plan:
//!     delay item  -> wait delay_seconds
//!     group item  -> repeat_count times:
//!                      submit closure(output nodes) -> wait for idle queue
//!                      -> optional delay
//! ```
//!
//! Two entry points share the same gating:
//! - [`Orchestrator::execute`] drives the plan from this process
//! - [`Orchestrator::delegate`] hands the whole plan to the server in one request
//!
//! Only one run per process holds the [`ExecutionLock`]. The run is reset to
//! idle on every exit path, including a dropped future, and the lock is
//! released only after that reset.
//!
//! Cancellation and interrupts are observed at checkpoints only: before each
//! item, before each repetition, once per poll cycle and after a delay. A
//! submission, status query or delay already underway runs to completion.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{BackendRequest, QueueBackend};
use crate::closure::filter_prompt;
use crate::config::ExecutorConfig;
use crate::enrich::{enrich_plan, total_tasks};
use crate::error::GroupExecError;
use crate::event_log::EventKind;
use crate::graph::{Eligibility, Workspace};
use crate::guard::{ExecutionGuard, ExecutionLock};
use crate::interrupt::{InterruptBus, InterruptListener};
use crate::plan::{EnrichedExecutionItem, ExecutionPlan, ItemKind};
use crate::poller::{PollerSettings, QueuePoller, WaitOutcome};
use crate::prompt::{Prompt, PromptSubmission};
use crate::run::{OrchestrationRun, RunOutcome, RunPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// How long Completed/Cancelled stay visible before reset
    pub status_hold: Duration,
    pub randomize_seeds: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            status_hold: Duration::from_secs(2),
            randomize_seeds: false,
        }
    }
}

/// A run holding the execution lock; resets the run, then releases the lock, on drop
struct ActiveRun<'a> {
    run: &'a mut OrchestrationRun,
    _guard: ExecutionGuard,
}

impl Deref for ActiveRun<'_> {
    type Target = OrchestrationRun;

    fn deref(&self) -> &OrchestrationRun {
        self.run
    }
}

impl DerefMut for ActiveRun<'_> {
    fn deref_mut(&mut self) -> &mut OrchestrationRun {
        self.run
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.run.reset();
    }
}

/// Checkpoint state for one run
struct Checkpoints {
    token: CancellationToken,
    interrupts: InterruptListener,
}

impl Checkpoints {
    /// True once the run should stop; pending interrupts cancel the token
    fn cancelled(&mut self) -> bool {
        if self.interrupts.take_pending() {
            info!("Interrupt received, cancelling run");
            self.token.cancel();
        }
        self.token.is_cancelled()
    }
}

pub struct Orchestrator {
    node_id: String,
    backend: Arc<dyn QueueBackend>,
    poller: QueuePoller,
    lock: Arc<ExecutionLock>,
    interrupts: InterruptBus,
    settings: RunSettings,
}

impl Orchestrator {
    /// Orchestrator on the process-wide lock and interrupt bus
    pub fn new(node_id: impl Into<String>, backend: Arc<dyn QueueBackend>, poller: PollerSettings) -> Self {
        Self {
            node_id: node_id.into(),
            poller: QueuePoller::new(Arc::clone(&backend), poller),
            backend,
            lock: ExecutionLock::global(),
            interrupts: InterruptBus::global(),
            settings: RunSettings::default(),
        }
    }

    pub fn from_config(node_id: impl Into<String>, backend: Arc<dyn QueueBackend>, config: &ExecutorConfig) -> Self {
        Self::new(node_id, backend, config.poller_settings()).with_settings(config.run_settings())
    }

    pub fn with_lock(mut self, lock: Arc<ExecutionLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_interrupts(mut self, interrupts: InterruptBus) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn interrupts(&self) -> &InterruptBus {
        &self.interrupts
    }

    /// Stop every live run and ask the server to stop its current job
    ///
    /// The server call is best effort: a failure is logged, never returned.
    pub async fn interrupt(&self) {
        let listeners = self.interrupts.publish();
        debug!(listeners, "Interrupt published");
        if let Err(e) = self.backend.interrupt().await {
            warn!(error = %e, "Server interrupt failed");
        }
    }

    /// Reject a run that is already executing or a locked process, then start it
    fn enter<'a>(&self, run: &'a mut OrchestrationRun, phase: RunPhase) -> Result<(ActiveRun<'a>, Checkpoints), GroupExecError> {
        if run.is_executing() {
            warn!(node_id = %self.node_id, "Run already executing, request rejected");
            return Err(GroupExecError::AlreadyExecuting {
                node_id: self.node_id.clone(),
            });
        }

        let guard = self.lock.try_acquire().map_err(|e| {
            warn!(node_id = %self.node_id, "Another execution holds the lock, request rejected");
            e
        })?;

        // Subscribing before begin() means interrupts from before this run are not seen
        let interrupts = self.interrupts.subscribe();
        let token = run.begin(phase);

        Ok((ActiveRun { run, _guard: guard }, Checkpoints { token, interrupts }))
    }

    /// Execute a plan from this process, one submission at a time
    #[instrument(skip_all, fields(node_id = %self.node_id, items = plan.len()))]
    pub async fn execute(
        &self,
        run: &mut OrchestrationRun,
        plan: &ExecutionPlan,
        workspace: &Workspace,
    ) -> Result<RunOutcome, GroupExecError> {
        let (mut active, mut checkpoints) = self.enter(run, RunPhase::Enriching)?;

        let result = self.drive(&mut active, &mut checkpoints, plan, workspace).await;
        match &result {
            Ok(_) => {
                // Completed/Cancelled stay visible for the hold period
                tokio::time::sleep(self.settings.status_hold).await;
            }
            Err(e) => self.fail(&mut active, e),
        }

        drop(active);
        result
    }

    async fn drive(
        &self,
        run: &mut OrchestrationRun,
        checkpoints: &mut Checkpoints,
        plan: &ExecutionPlan,
        workspace: &Workspace,
    ) -> Result<RunOutcome, GroupExecError> {
        let started = Instant::now();

        let items = enrich_plan(plan, &workspace.graph, &workspace.catalog, run.events())?;
        let total = total_tasks(&items);
        run.set_total_tasks(total);
        run.set_phase(RunPhase::Executing);
        run.events().emit(EventKind::RunStarted {
            node_id: self.node_id.as_str().into(),
            items: items.len(),
            total_tasks: total,
        });
        info!(total_tasks = total, "Run started");

        let snapshot = workspace.render_prompt(Eligibility::ForceAll);
        if snapshot.is_empty() && total > 0 {
            return Err(GroupExecError::EmptySnapshot);
        }

        for item in &items {
            if checkpoints.cancelled() {
                break;
            }

            match &item.item.kind {
                ItemKind::Delay => {
                    let seconds = item.item.delay_seconds;
                    if seconds > 0.0 {
                        run.set_status(format!("Waiting {}s before next group", seconds));
                        self.delay(run, seconds, None).await;
                    }
                }
                ItemKind::Group { name, repeat_count } => {
                    self.run_group(run, checkpoints, item, name, *repeat_count, &snapshot, total)
                        .await
                        .map_err(|e| e.in_group(name.as_str()))?;
                }
            }
        }

        if checkpoints.cancelled() {
            let completed = run.current_task();
            run.set_phase(RunPhase::Cancelled);
            run.set_status("Cancelled");
            run.events().emit(EventKind::RunCancelled {
                current_task: completed,
                total_tasks: total,
            });
            info!(completed, total, "Run cancelled");
            return Ok(RunOutcome::Cancelled {
                completed_tasks: completed,
                total_tasks: total,
            });
        }

        run.set_phase(RunPhase::Completed);
        run.set_status(format!("Completed ({}/{})", total, total));
        run.events().emit(EventKind::RunCompleted {
            total_tasks: total,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        info!(total, "Run completed");
        Ok(RunOutcome::Completed { total_tasks: total })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_group(
        &self,
        run: &mut OrchestrationRun,
        checkpoints: &mut Checkpoints,
        item: &EnrichedExecutionItem,
        name: &str,
        repeat_count: u32,
        snapshot: &Prompt,
        total: u32,
    ) -> Result<(), GroupExecError> {
        let delay_seconds = item.item.delay_seconds;

        for repetition in 0..repeat_count {
            if checkpoints.cancelled() {
                return Ok(());
            }

            let current = run.next_task();
            run.set_status(format!("Executing {} ({}/{})", name, current, total));
            info!(group = %name, current, total, "Submitting group");

            let prompt = self.build_payload(snapshot, &item.output_node_ids)?;
            let accepted = self.backend.submit(PromptSubmission::tagged(prompt)).await?;
            debug!(group = %name, prompt_id = %accepted.prompt_id, "Submission accepted");
            run.events().emit(EventKind::TaskSubmitted {
                group: name.into(),
                current,
                total,
                prompt_id: accepted.prompt_id,
            });

            let outcome = self.poller.wait_for_idle(|| checkpoints.cancelled()).await?;
            if outcome == WaitOutcome::Cancelled {
                return Ok(());
            }
            run.events().emit(EventKind::QueueIdle {
                group: name.into(),
                current,
            });

            let more_remaining = repetition + 1 < repeat_count || current < total;
            if delay_seconds > 0.0 && more_remaining && !checkpoints.cancelled() {
                run.set_status(format!(
                    "Executing {} ({}/{}) - waiting {}s",
                    name, current, total, delay_seconds
                ));
                self.delay(run, delay_seconds, Some(name)).await;
            }
        }

        Ok(())
    }

    /// Full-length wait; cancellation is picked up at the following checkpoint
    async fn delay(&self, run: &mut OrchestrationRun, seconds: f64, group: Option<&str>) {
        run.set_phase(RunPhase::Delaying);
        run.events().emit(EventKind::DelayStarted {
            seconds,
            group: group.map(Into::into),
        });
        debug!(seconds, "Delaying");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        run.set_phase(RunPhase::Executing);
    }

    /// Dependency closure of the group's output nodes over the full snapshot
    fn build_payload(&self, snapshot: &Prompt, output_node_ids: &[String]) -> Result<Prompt, GroupExecError> {
        let mut prompt = filter_prompt(snapshot, output_node_ids);
        if prompt.is_empty() {
            return Err(GroupExecError::EmptySnapshot);
        }
        if self.settings.randomize_seeds {
            let changed = prompt.randomize_seeds(&mut rand::thread_rng());
            debug!(changed, "Randomized seeds");
        }
        Ok(prompt)
    }

    /// Hand the enriched plan and a full snapshot to the server
    ///
    /// Acceptance ends this process's responsibility; the run resets
    /// immediately either way.
    #[instrument(skip_all, fields(node_id = %self.node_id, items = plan.len()))]
    pub async fn delegate(
        &self,
        run: &mut OrchestrationRun,
        plan: &ExecutionPlan,
        workspace: &Workspace,
    ) -> Result<RunOutcome, GroupExecError> {
        let (mut active, mut checkpoints) = self.enter(run, RunPhase::Enriching)?;

        let result = self.send_plan(&mut active, &mut checkpoints, plan, workspace).await;
        if let Err(e) = &result {
            self.fail(&mut active, e);
        }

        drop(active);
        result
    }

    async fn send_plan(
        &self,
        run: &mut OrchestrationRun,
        checkpoints: &mut Checkpoints,
        plan: &ExecutionPlan,
        workspace: &Workspace,
    ) -> Result<RunOutcome, GroupExecError> {
        let items = enrich_plan(plan, &workspace.graph, &workspace.catalog, run.events())?;
        let total = total_tasks(&items);
        run.set_total_tasks(total);

        if checkpoints.cancelled() {
            run.set_phase(RunPhase::Cancelled);
            run.set_status("Cancelled");
            run.events().emit(EventKind::RunCancelled {
                current_task: 0,
                total_tasks: total,
            });
            return Ok(RunOutcome::Cancelled {
                completed_tasks: 0,
                total_tasks: total,
            });
        }

        let api_prompt = workspace.render_prompt(Eligibility::ForceAll);
        if api_prompt.is_empty() {
            return Err(GroupExecError::EmptySnapshot);
        }

        run.set_phase(RunPhase::Delegating);
        info!(items = items.len(), nodes = api_prompt.len(), "Delegating plan to server");

        let request = BackendRequest {
            node_id: self.node_id.clone(),
            execution_list: items,
            api_prompt,
        };
        let ack = self.backend.delegate(&request).await?;

        run.events().emit(EventKind::Delegated {
            items: request.execution_list.len(),
            message: ack.message.clone(),
        });
        info!(message = %ack.message, "Server accepted plan");

        Ok(RunOutcome::Delegated {
            items: request.execution_list.len(),
            message: ack.message,
        })
    }

    fn fail(&self, run: &mut OrchestrationRun, e: &GroupExecError) {
        let group = match e {
            GroupExecError::SubmissionFailure { group, .. } => Some(group.as_str().into()),
            _ => None,
        };
        run.set_phase(RunPhase::Failed);
        run.set_status(format!("Error: {}", e));
        run.events().emit(EventKind::RunFailed {
            group,
            error: e.to_string(),
        });
        error!(error = %e, "Run failed");
    }
}
