//! Run event log
//!
//! Append-only record of what an orchestration run did, for observers and
//! post-run inspection.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run-level and task-level variants
//! - EventLog: thread-safe, cheap to clone

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in a run's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// Everything a run reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        node_id: Arc<str>,
        items: usize,
        total_tasks: u32,
    },
    RunCompleted {
        total_tasks: u32,
        duration_ms: u64,
    },
    RunCancelled {
        current_task: u32,
        total_tasks: u32,
    },
    RunFailed {
        group: Option<Arc<str>>,
        error: String,
    },
    /// Plan handed to the server in one request
    Delegated {
        items: usize,
        message: String,
    },

    // ═══════════════════════════════════════════
    // ITEM / TASK LEVEL
    // ═══════════════════════════════════════════
    ItemSkipped {
        index: usize,
        group: Arc<str>,
        reason: String,
    },
    DelayStarted {
        seconds: f64,
        /// Group whose repetition triggered the delay, `None` for delay items
        group: Option<Arc<str>>,
    },
    TaskSubmitted {
        group: Arc<str>,
        current: u32,
        total: u32,
        prompt_id: String,
    },
    QueueIdle {
        group: Arc<str>,
        current: u32,
    },
}

impl EventKind {
    /// Group the event refers to, if any
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::ItemSkipped { group, .. }
            | Self::TaskSubmitted { group, .. }
            | Self::QueueIdle { group, .. } => Some(group),
            Self::DelayStarted { group, .. } | Self::RunFailed { group, .. } => group.as_deref(),
            Self::RunStarted { .. }
            | Self::RunCompleted { .. }
            | Self::RunCancelled { .. }
            | Self::Delegated { .. } => None,
        }
    }

    /// Events that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. }
                | Self::RunCancelled { .. }
                | Self::RunFailed { .. }
                | Self::Delegated { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event, returns its id
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events mentioning `group`
    pub fn filter_group(&self, group: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.group() == Some(group))
            .collect()
    }

    /// Groups in submission order, one entry per submitted task
    pub fn submitted_groups(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::TaskSubmitted { group, .. } => Some(group.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<Event> {
        self.events.read().last().cloned()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(group: &str, current: u32) -> EventKind {
        EventKind::TaskSubmitted {
            group: group.into(),
            current,
            total: 3,
            prompt_id: format!("p{}", current),
        }
    }

    #[test]
    fn eventkind_group_extraction() {
        assert_eq!(submitted("A", 1).group(), Some("A"));
        assert_eq!(EventKind::DelayStarted { seconds: 1.0, group: None }.group(), None);
        assert_eq!(
            EventKind::RunStarted { node_id: "7".into(), items: 1, total_tasks: 1 }.group(),
            None
        );
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let json = serde_json::to_value(submitted("Upscale", 2)).unwrap();
        assert_eq!(json["type"], "task_submitted");
        assert_eq!(json["group"], "Upscale");
        assert_eq!(json["current"], 2);
    }

    #[test]
    fn eventlog_ids_are_monotonic_and_shared_between_clones() {
        let log = EventLog::new();
        let clone = log.clone();

        assert_eq!(log.emit(submitted("A", 1)), 0);
        assert_eq!(clone.emit(submitted("A", 2)), 1);
        assert_eq!(log.emit(submitted("B", 3)), 2);

        assert_eq!(log.len(), 3);
        assert_eq!(log.submitted_groups(), vec!["A", "A", "B"]);
        assert_eq!(log.filter_group("B").len(), 1);
    }

    #[test]
    fn eventlog_terminal_events() {
        let log = EventLog::new();
        log.emit(submitted("A", 1));
        assert!(!log.last().unwrap().kind.is_terminal());

        log.emit(EventKind::RunCompleted { total_tasks: 1, duration_ms: 5 });
        assert!(log.last().unwrap().kind.is_terminal());

        log.clear();
        assert!(log.is_empty());
    }
}
