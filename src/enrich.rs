//! Execution list enrichment
//!
//! Freezes each group item's output nodes at run start so later layout
//! changes cannot alter an in-flight run.

use tracing::{info, warn};

use crate::error::GroupExecError;
use crate::event_log::{EventKind, EventLog};
use crate::graph::{Eligibility, Graph, NodeCatalog};
use crate::plan::{EnrichedExecutionItem, ExecutionPlan, ItemKind};
use crate::resolver::GroupResolver;

/// Resolve every group item of `plan`, dropping the ones with nothing to run
///
/// Delay items always survive, so a plan of only delays is valid. The plan
/// is empty only when no group resolved and no delay remains.
///
/// Groups resolve under [`Eligibility::ForceAll`], so muted output nodes
/// still count. Skipped items are logged and recorded as `ItemSkipped`.
pub fn enrich_plan(
    plan: &ExecutionPlan,
    graph: &Graph,
    catalog: &NodeCatalog,
    events: &EventLog,
) -> Result<Vec<EnrichedExecutionItem>, GroupExecError> {
    let resolver = GroupResolver::new(graph, catalog).with_view(Eligibility::ForceAll);
    let mut enriched = Vec::with_capacity(plan.len());

    for (index, item) in plan.items().iter().enumerate() {
        let name = match &item.kind {
            ItemKind::Delay => {
                enriched.push(EnrichedExecutionItem::delay(item.clone()));
                continue;
            }
            ItemKind::Group { name, .. } => name,
        };

        if name.is_empty() {
            warn!(index, "Skipping item with empty group name");
            events.emit(EventKind::ItemSkipped {
                index,
                group: "".into(),
                reason: "empty group name".to_string(),
            });
            continue;
        }

        let binding = resolver.resolve(name);
        if binding.is_empty() {
            warn!(index, group = %name, "Skipping group without output nodes");
            events.emit(EventKind::ItemSkipped {
                index,
                group: name.as_str().into(),
                reason: "no output nodes".to_string(),
            });
            continue;
        }

        enriched.push(EnrichedExecutionItem {
            item: item.clone(),
            output_node_ids: binding.node_ids,
        });
    }

    if enriched.is_empty() {
        return Err(GroupExecError::EmptyPlan);
    }

    info!(
        items = enriched.len(),
        total_tasks = total_tasks(&enriched),
        "Enriched execution list"
    );
    Ok(enriched)
}

/// Number of submissions a run of `items` makes
pub fn total_tasks(items: &[EnrichedExecutionItem]) -> u32 {
    items.iter().map(|e| e.item.task_count()).sum()
}
