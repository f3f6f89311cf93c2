//! groupexec - sequential group executor for queue-based node graph servers

pub mod client;
pub mod closure;
pub mod config;
pub mod enrich;
pub mod error;
pub mod event_log;
pub mod graph;
pub mod guard;
pub mod interrupt;
pub mod orchestrator;
pub mod plan;
pub mod poller;
pub mod prompt;
pub mod resolver;
pub mod run;

pub use client::{BackendAck, BackendRequest, HttpQueueClient, MockQueue, QueueBackend, QueueStatus};
pub use closure::{collect_dependencies, filter_prompt, intercept};
pub use config::ExecutorConfig;
pub use enrich::{enrich_plan, total_tasks};
pub use error::{FixSuggestion, GroupExecError};
pub use event_log::{Event, EventKind, EventLog};
pub use graph::{Eligibility, Graph, NodeCatalog, NodeId, Workspace};
pub use guard::{ExecutionGuard, ExecutionLock};
pub use interrupt::InterruptBus;
pub use orchestrator::{Orchestrator, RunSettings};
pub use plan::{EnrichedExecutionItem, ExecutionItem, ExecutionPlan, ItemKind};
pub use poller::{PollerSettings, QueuePoller, WaitOutcome};
pub use prompt::{Prompt, PromptAccepted, PromptSubmission};
pub use resolver::{GroupBinding, GroupResolver};
pub use run::{CancelHandle, OrchestrationRun, RunOutcome, RunPhase};
