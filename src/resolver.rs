//! Group resolution
//!
//! Maps a group name to the output nodes that currently sit inside its
//! bounding box. Membership is recomputed from geometry on every call since
//! nodes may have moved since the last run.

use tracing::{debug, warn};

use crate::error::GroupExecError;
use crate::graph::{Eligibility, Graph, NodeCatalog, NodeId};

/// Resolved `group -> output node ids` mapping for one call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupBinding {
    pub group_name: String,
    pub node_ids: Vec<NodeId>,
}

impl GroupBinding {
    fn empty(group_name: &str) -> Self {
        Self {
            group_name: group_name.to_string(),
            node_ids: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// Resolves group names against a layout and node catalog
#[derive(Debug, Clone, Copy)]
pub struct GroupResolver<'a> {
    graph: &'a Graph,
    catalog: &'a NodeCatalog,
    view: Eligibility,
}

impl<'a> GroupResolver<'a> {
    pub fn new(graph: &'a Graph, catalog: &'a NodeCatalog) -> Self {
        Self {
            graph,
            catalog,
            view: Eligibility::AsAuthored,
        }
    }

    /// Read node modes through `view` instead of as authored
    pub fn with_view(mut self, view: Eligibility) -> Self {
        self.view = view;
        self
    }

    /// Eligible output nodes inside the group, in graph order
    ///
    /// An unknown group resolves to an empty binding with a warning.
    pub fn resolve(&self, group_name: &str) -> GroupBinding {
        let Some(group) = self.graph.find_group(group_name) else {
            let err = GroupExecError::GroupNotFound {
                group: group_name.to_string(),
            };
            warn!(error = %err, "Resolving to an empty binding");
            return GroupBinding::empty(group_name);
        };

        let members: Vec<_> = self.graph.nodes_overlapping(&group.bounding).collect();
        debug!(
            group = %group_name,
            bounding = ?group.bounding,
            members = members.len(),
            "Recomputed group membership"
        );

        if members.is_empty() {
            warn!(group = %group_name, "Group contains no nodes");
            return GroupBinding::empty(group_name);
        }

        let node_ids = members
            .into_iter()
            .filter(|node| self.view.is_eligible(node) && self.catalog.is_output(&node.node_type))
            .filter(|node| {
                let inside = node.bounding().overlaps(&group.bounding);
                if !inside {
                    warn!(
                        group = %group_name,
                        node = %node.id,
                        "Output node was listed in group but lies outside its bounds"
                    );
                }
                inside
            })
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();

        if node_ids.is_empty() {
            warn!(group = %group_name, "Group has no eligible output nodes");
        } else {
            debug!(group = %group_name, outputs = ?node_ids, "Resolved output nodes");
        }

        GroupBinding {
            group_name: group_name.to_string(),
            node_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Bounds, Group, GraphNode, NodeMode};

    fn node(id: &str, node_type: &str, x: f64, y: f64, mode: NodeMode) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            pos: [x, y],
            size: [100.0, 60.0],
            mode,
        }
    }

    fn layout() -> (Graph, NodeCatalog) {
        let graph = Graph {
            nodes: vec![
                node("10", "SaveImage", 20.0, 50.0, NodeMode::Always),
                node("11", "KSampler", 150.0, 50.0, NodeMode::Always),
                node("12", "PreviewImage", 300.0, 50.0, NodeMode::Never),
                node("20", "SaveImage", 1000.0, 1000.0, NodeMode::Always),
            ],
            groups: vec![
                Group {
                    id: Some("1".into()),
                    title: "Render".into(),
                    bounding: Bounds::new(0.0, 0.0, 500.0, 200.0),
                },
                Group {
                    id: Some("2".into()),
                    title: "Empty".into(),
                    bounding: Bounds::new(5000.0, 5000.0, 10.0, 10.0),
                },
            ],
        };
        let catalog = NodeCatalog::new()
            .with_output("SaveImage")
            .with_output("PreviewImage");
        (graph, catalog)
    }

    #[test]
    fn test_resolves_eligible_outputs_in_graph_order() {
        let (graph, catalog) = layout();
        let binding = GroupResolver::new(&graph, &catalog).resolve("Render");
        assert_eq!(binding.node_ids, vec!["10"]);
    }

    #[test]
    fn test_force_all_view_sees_muted_outputs() {
        let (graph, catalog) = layout();
        let binding = GroupResolver::new(&graph, &catalog)
            .with_view(Eligibility::ForceAll)
            .resolve("Render");
        assert_eq!(binding.node_ids, vec!["10", "12"]);
        assert_eq!(graph.nodes[2].mode, NodeMode::Never);
    }

    #[test]
    fn test_falls_back_to_group_id() {
        let (graph, catalog) = layout();
        let binding = GroupResolver::new(&graph, &catalog).resolve("1");
        assert_eq!(binding.node_ids, vec!["10"]);
        assert_eq!(binding.group_name, "1");
    }

    #[test]
    fn test_unknown_group_is_empty_not_error() {
        let (graph, catalog) = layout();
        assert!(GroupResolver::new(&graph, &catalog).resolve("Nope").is_empty());
    }

    #[test]
    fn test_group_overlapping_nothing_is_empty() {
        let (graph, catalog) = layout();
        assert!(GroupResolver::new(&graph, &catalog).resolve("Empty").is_empty());
    }

    #[test]
    fn test_moved_nodes_change_membership() {
        let (mut graph, catalog) = layout();
        graph.nodes[3].pos = [100.0, 120.0];
        let binding = GroupResolver::new(&graph, &catalog).resolve("Render");
        assert_eq!(binding.node_ids, vec!["10", "20"]);
    }
}
