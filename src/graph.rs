//! Graph layout model
//!
//! Mirrors the editor's workflow document closely enough to answer two
//! questions: which nodes sit inside a group's bounding box, and which of
//! them are eligible output nodes.
//!
//! - [`Graph`]: nodes and groups as laid out in the editor
//! - [`NodeCatalog`]: per-class metadata reported by the server (`/object_info`)
//! - [`Eligibility`]: read-only override of node modes
//! - [`Workspace`]: layout + catalog + submission prompt for one run

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::prompt::Prompt;

/// Height of a node's title bar, included in its bounding box
pub const TITLE_HEIGHT: f64 = 30.0;

/// Node identifiers are numeric in the editor and strings in prompts
pub type NodeId = String;

// ============================================================================
// GEOMETRY
// ============================================================================

/// Axis-aligned rectangle `[x, y, width, height]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Overlap test; rectangles that only touch at an edge overlap
    pub fn overlaps(&self, other: &Bounds) -> bool {
        let self_end_x = self.x + self.width;
        let self_end_y = self.y + self.height;
        let other_end_x = other.x + other.width;
        let other_end_y = other.y + other.height;

        !(self.x > other_end_x
            || self.y > other_end_y
            || self_end_x < other.x
            || self_end_y < other.y)
    }
}

impl From<[f64; 4]> for Bounds {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Bounds> for [f64; 4] {
    fn from(b: Bounds) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

// ============================================================================
// NODE MODES
// ============================================================================

/// Execution mode of a node as stored in the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodeMode {
    #[default]
    Always,
    OnEvent,
    Never,
    OnTrigger,
    Bypass,
    Other(u8),
}

impl From<u8> for NodeMode {
    fn from(v: u8) -> Self {
        match v {
            0 => NodeMode::Always,
            1 => NodeMode::OnEvent,
            2 => NodeMode::Never,
            3 => NodeMode::OnTrigger,
            4 => NodeMode::Bypass,
            other => NodeMode::Other(other),
        }
    }
}

impl From<NodeMode> for u8 {
    fn from(m: NodeMode) -> Self {
        match m {
            NodeMode::Always => 0,
            NodeMode::OnEvent => 1,
            NodeMode::Never => 2,
            NodeMode::OnTrigger => 3,
            NodeMode::Bypass => 4,
            NodeMode::Other(v) => v,
        }
    }
}

/// How node modes are read during resolution and snapshotting
///
/// `ForceAll` treats every node as if its mode were `Always` without
/// touching the stored modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eligibility {
    #[default]
    AsAuthored,
    ForceAll,
}

impl Eligibility {
    pub fn effective_mode(self, node: &GraphNode) -> NodeMode {
        match self {
            Eligibility::AsAuthored => node.mode,
            Eligibility::ForceAll => NodeMode::Always,
        }
    }

    /// Eligible nodes are those not muted (`Never`)
    pub fn is_eligible(self, node: &GraphNode) -> bool {
        self.effective_mode(node) != NodeMode::Never
    }

    /// Whether the node's prompt entry is kept when rendering a snapshot
    pub fn renders(self, node: &GraphNode) -> bool {
        !matches!(self.effective_mode(node), NodeMode::Never | NodeMode::Bypass)
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

/// A node as laid out in the editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub pos: [f64; 2],
    #[serde(default)]
    pub size: [f64; 2],
    #[serde(default)]
    pub mode: NodeMode,
}

impl GraphNode {
    /// Bounding box including the title bar above `pos`
    pub fn bounding(&self) -> Bounds {
        Bounds::new(
            self.pos[0],
            self.pos[1] - TITLE_HEIGHT,
            self.size[0],
            self.size[1] + TITLE_HEIGHT,
        )
    }
}

/// A titled, rectangular group of nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub bounding: Bounds,
}

/// Editor layout: nodes in graph order plus groups
///
/// Unknown fields of the workflow document (links, extra, version) are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Graph {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a group by exact title, falling back to its id
    pub fn find_group(&self, name: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.title == name)
            .or_else(|| self.groups.iter().find(|g| g.id.as_deref() == Some(name)))
    }

    /// Nodes whose bounding box overlaps `bounds`, in graph order
    pub fn nodes_overlapping<'a>(&'a self, bounds: &'a Bounds) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.bounding().overlaps(bounds))
    }
}

// ============================================================================
// NODE CATALOG
// ============================================================================

/// Metadata for one node class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    #[serde(default)]
    pub output_node: bool,
}

/// Node class metadata keyed by class name (the `/object_info` shape)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeCatalog {
    types: HashMap<String, NodeTypeInfo>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Declare a class as an output node (builder style)
    pub fn with_output(mut self, class_name: impl Into<String>) -> Self {
        self.types
            .insert(class_name.into(), NodeTypeInfo { output_node: true });
        self
    }

    pub fn insert(&mut self, class_name: impl Into<String>, info: NodeTypeInfo) {
        self.types.insert(class_name.into(), info);
    }

    /// Unknown classes are not output nodes
    pub fn is_output(&self, class_name: &str) -> bool {
        self.types
            .get(class_name)
            .map(|info| info.output_node)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ============================================================================
// WORKSPACE
// ============================================================================

/// Everything a run reads from the editor side
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub graph: Graph,
    pub catalog: NodeCatalog,
    /// Full prompt as exported by the editor, every node included
    pub prompt: Prompt,
}

impl Workspace {
    pub fn new(graph: Graph, catalog: NodeCatalog, prompt: Prompt) -> Self {
        Self { graph, catalog, prompt }
    }

    /// Render the submission snapshot under an eligibility view
    ///
    /// Prompt entries without a layout node are always kept.
    pub fn render_prompt(&self, view: Eligibility) -> Prompt {
        self.prompt.retain_ids(|id| match self.graph.node(id) {
            Some(node) => view.renders(node),
            None => true,
        })
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(i64),
    Str(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Num(n) => write!(f, "{}", n),
            RawId::Str(s) => f.write_str(s),
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(|id| id.to_string())
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|id| id.map(|id| id.to_string()))
}
