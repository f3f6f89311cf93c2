//! Execution plans
//!
//! A plan is an ordered list of items: run a group `repeat_count` times, or
//! wait. On the wire a wait is a group item named [`DELAY_GROUP`].
//!
//! ```yaml
//! items:
//!   - group_name: Base
//!     repeat_count: 2
//!     delay_seconds: 1
//!   - group_name: __delay__
//!     delay_seconds: 3
//!   - group_name: Upscale
//! ```

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GroupExecError;
use crate::graph::NodeId;

/// Reserved group name marking a delay item
pub const DELAY_GROUP: &str = "__delay__";

/// Separators accepted in a group list: commas and newlines
static GROUP_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,\n]+").expect("valid group separator pattern"));

// ============================================================================
// ITEMS
// ============================================================================

/// What an item does
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Group { name: String, repeat_count: u32 },
    Delay,
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "RawItem")]
pub struct ExecutionItem {
    pub kind: ItemKind,
    pub delay_seconds: f64,
}

impl ExecutionItem {
    pub fn group(name: impl Into<String>, repeat_count: u32, delay_seconds: f64) -> Self {
        Self {
            kind: ItemKind::Group {
                name: name.into(),
                repeat_count: repeat_count.max(1),
            },
            delay_seconds,
        }
    }

    pub fn delay(delay_seconds: f64) -> Self {
        Self {
            kind: ItemKind::Delay,
            delay_seconds,
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, ItemKind::Delay)
    }

    /// Group name, `None` for delay items
    pub fn group_name(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Group { name, .. } => Some(name),
            ItemKind::Delay => None,
        }
    }

    /// Tasks this item adds to a run's total (delays add none)
    pub fn task_count(&self) -> u32 {
        match self.kind {
            ItemKind::Group { repeat_count, .. } => repeat_count,
            ItemKind::Delay => 0,
        }
    }

    fn from_raw(index: usize, raw: RawItem) -> Result<Self, GroupExecError> {
        let delay_seconds = raw.delay_seconds.unwrap_or(0.0);
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(GroupExecError::InvalidItem {
                index,
                reason: format!("delay_seconds must be finite and >= 0, got {}", delay_seconds),
            });
        }

        if raw.group_name == DELAY_GROUP {
            return Ok(Self::delay(delay_seconds));
        }

        let repeat_count = match raw.repeat_count {
            None | Some(0) => 1,
            Some(n) if n < 0 => {
                return Err(GroupExecError::InvalidItem {
                    index,
                    reason: format!("repeat_count must be >= 1, got {}", n),
                })
            }
            Some(n) => u32::try_from(n).map_err(|_| GroupExecError::InvalidItem {
                index,
                reason: format!("repeat_count {} is too large", n),
            })?,
        };

        Ok(Self::group(raw.group_name.trim(), repeat_count, delay_seconds))
    }
}

/// Wire form shared with the server
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawItem {
    #[serde(default)]
    group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repeat_count: Option<i64>,
    #[serde(default)]
    delay_seconds: Option<f64>,
}

impl From<ExecutionItem> for RawItem {
    fn from(item: ExecutionItem) -> Self {
        match item.kind {
            ItemKind::Group { name, repeat_count } => RawItem {
                group_name: name,
                repeat_count: Some(i64::from(repeat_count)),
                delay_seconds: Some(item.delay_seconds),
            },
            ItemKind::Delay => RawItem {
                group_name: DELAY_GROUP.to_string(),
                repeat_count: None,
                delay_seconds: Some(item.delay_seconds),
            },
        }
    }
}

/// An item with its output nodes resolved and frozen for the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedExecutionItem {
    #[serde(flatten)]
    pub item: ExecutionItem,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_node_ids: Vec<NodeId>,
}

impl EnrichedExecutionItem {
    pub fn delay(item: ExecutionItem) -> Self {
        Self {
            item,
            output_node_ids: Vec::new(),
        }
    }
}

// ============================================================================
// PLAN
// ============================================================================

/// Plan file: a bare list of items or `{ items: [...] }`
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    List(Vec<RawItem>),
    Document { items: Vec<RawItem> },
}

/// Ordered, caller-owned list of items
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionPlan {
    items: Vec<ExecutionItem>,
}

impl ExecutionPlan {
    pub fn new(items: Vec<ExecutionItem>) -> Self {
        Self { items }
    }

    /// Parse a YAML or JSON plan
    pub fn from_yaml(source: &str) -> Result<Self, GroupExecError> {
        let raw = match serde_yaml::from_str::<PlanFile>(source)? {
            PlanFile::List(items) | PlanFile::Document { items } => items,
        };

        let items = raw
            .into_iter()
            .enumerate()
            .map(|(index, raw)| ExecutionItem::from_raw(index, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { items })
    }

    /// Read and parse a plan file
    pub fn from_path(path: &Path) -> Result<Self, GroupExecError> {
        let source = fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    /// One item per name in a comma/newline separated list, sharing repeat and delay
    pub fn from_group_list(list: &str, repeat_count: u32, delay_seconds: f64) -> Result<Self, GroupExecError> {
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(GroupExecError::InvalidItem {
                index: 0,
                reason: format!("delay_seconds must be finite and >= 0, got {}", delay_seconds),
            });
        }

        let items = GROUP_SEPARATOR
            .split(list)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                if name == DELAY_GROUP {
                    ExecutionItem::delay(delay_seconds)
                } else {
                    ExecutionItem::group(name, repeat_count, delay_seconds)
                }
            })
            .collect();

        Ok(Self { items })
    }

    /// Append an upstream plan after this one's items
    pub fn chain(mut self, upstream: ExecutionPlan) -> Self {
        self.items.extend(upstream.items);
        self
    }

    pub fn items(&self) -> &[ExecutionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of repetitions over group items
    pub fn task_count(&self) -> u32 {
        self.items.iter().map(ExecutionItem::task_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_document_plan() {
        let plan = ExecutionPlan::from_yaml(
            r#"
items:
  - group_name: A
    repeat_count: 2
    delay_seconds: 1
  - group_name: __delay__
    delay_seconds: 3
  - group_name: B
"#,
        )
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.items()[0], ExecutionItem::group("A", 2, 1.0));
        assert!(plan.items()[1].is_delay());
        assert_eq!(plan.items()[2], ExecutionItem::group("B", 1, 0.0));
        assert_eq!(plan.task_count(), 3);
    }

    #[test]
    fn test_parse_json_list_plan() {
        let plan = ExecutionPlan::from_yaml(
            r#"[{"group_name": "A", "repeat_count": 0}, {"group_name": "__delay__", "delay_seconds": 2.5}]"#,
        )
        .unwrap();
        assert_eq!(plan.items()[0].task_count(), 1);
        assert_eq!(plan.items()[1].delay_seconds, 2.5);
    }

    #[test]
    fn test_rejects_invalid_items() {
        let err = ExecutionPlan::from_yaml("- group_name: A\n- group_name: B\n  delay_seconds: -1\n").unwrap_err();
        assert!(matches!(err, GroupExecError::InvalidItem { index: 1, .. }));

        let err = ExecutionPlan::from_yaml("- group_name: A\n  repeat_count: -3\n").unwrap_err();
        assert!(matches!(err, GroupExecError::InvalidItem { index: 0, .. }));
    }

    #[test]
    fn test_group_list_and_chaining() {
        let upstream = ExecutionPlan::new(vec![ExecutionItem::group("Z", 1, 0.0)]);
        let plan = ExecutionPlan::from_group_list("A, B\n\nC,", 2, 0.5)
            .unwrap()
            .chain(upstream);

        let names: Vec<_> = plan.items().iter().filter_map(|i| i.group_name()).collect();
        assert_eq!(names, vec!["A", "B", "C", "Z"]);
        assert_eq!(plan.task_count(), 7);
    }

    #[test]
    fn test_wire_format() {
        let enriched = EnrichedExecutionItem {
            item: ExecutionItem::group("A", 2, 1.0),
            output_node_ids: vec!["9".into()],
        };
        assert_eq!(
            serde_json::to_value(&enriched).unwrap(),
            json!({"group_name": "A", "repeat_count": 2, "delay_seconds": 1.0, "output_node_ids": ["9"]})
        );

        let delay = EnrichedExecutionItem::delay(ExecutionItem::delay(3.0));
        assert_eq!(
            serde_json::to_value(&delay).unwrap(),
            json!({"group_name": "__delay__", "delay_seconds": 3.0})
        );
    }
}
