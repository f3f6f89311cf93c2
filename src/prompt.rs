//! Submission format of the queue server
//!
//! A [`Prompt`] maps node ids to `{class_type, inputs}` entries. An input that
//! holds `[source_id, slot]` (or `{"link_id": ..}`) is a link to the node that
//! feeds it; every other input value is a literal.
//!
//! Node order is preserved exactly as exported.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GroupExecError;
use crate::graph::NodeId;

/// Input names re-rolled by [`Prompt::randomize_seeds`]
pub const SEED_INPUTS: &[&str] = &["seed", "noise_seed"];

/// API-format prompt: node id -> node entry, in export order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt {
    nodes: Map<String, Value>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self, GroupExecError> {
        match value {
            Value::Object(nodes) => Ok(Self { nodes }),
            other => Err(GroupExecError::Config(format!(
                "prompt must be a JSON object keyed by node id, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, GroupExecError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in export order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.nodes.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: Value) {
        self.nodes.insert(id.into(), entry);
    }

    pub fn class_type(&self, id: &str) -> Option<&str> {
        self.nodes.get(id)?.get("class_type")?.as_str()
    }

    /// Ids of the nodes feeding `id`'s inputs, in input order
    pub fn input_sources(&self, id: &str) -> Vec<NodeId> {
        let Some(inputs) = self
            .nodes
            .get(id)
            .and_then(|n| n.get("inputs"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };

        inputs.values().filter_map(link_source).collect()
    }

    /// Ids of every node with the given class, in export order
    pub fn ids_of_class(&self, class_type: &str) -> Vec<NodeId> {
        self.ids()
            .filter(|id| self.class_type(id) == Some(class_type))
            .map(str::to_string)
            .collect()
    }

    /// Copy of the prompt keeping only ids accepted by `keep`, order preserved
    pub fn retain_ids<F>(&self, mut keep: F) -> Prompt
    where
        F: FnMut(&str) -> bool,
    {
        let nodes = self
            .nodes
            .iter()
            .filter(|(id, _)| keep(id))
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();
        Prompt { nodes }
    }

    /// Give every seed input a fresh random value, returns how many changed
    pub fn randomize_seeds<R: Rng>(&mut self, rng: &mut R) -> usize {
        let mut changed = 0;
        for node in self.nodes.values_mut() {
            let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) else {
                continue;
            };
            for name in SEED_INPUTS {
                // Linked seeds come from another node and are left alone
                if let Some(slot) = inputs.get_mut(*name) {
                    if link_source(slot).is_none() {
                        *slot = Value::from(rng.gen::<u64>());
                        changed += 1;
                    }
                }
            }
        }
        changed
    }
}

/// Source node of a linked input, `None` for literals and empty links
fn link_source(value: &Value) -> Option<NodeId> {
    match value {
        Value::Array(items) => items.first().and_then(id_of),
        Value::Object(obj) => obj.get("link_id").and_then(id_of),
        _ => None,
    }
}

fn id_of(value: &Value) -> Option<NodeId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Extra data attached to a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    /// Set on submissions already reduced by the closure filter
    #[serde(
        rename = "isGroupExecutorRequest",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_group_executor_request: bool,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Body of `POST /prompt`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSubmission {
    pub prompt: Prompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub extra_data: ExtraData,
}

impl PromptSubmission {
    /// A user-originated submission (eligible for interception)
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            ..Default::default()
        }
    }

    /// A submission that is already minimal and must not be filtered again
    pub fn tagged(prompt: Prompt) -> Self {
        let mut submission = Self::new(prompt);
        submission.extra_data.is_group_executor_request = true;
        submission
    }

    pub fn is_tagged(&self) -> bool {
        self.extra_data.is_group_executor_request
    }
}

/// Successful response of `POST /prompt`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptAccepted {
    pub prompt_id: String,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Prompt {
        Prompt::from_value(json!({
            "4": {"class_type": "CheckpointLoader", "inputs": {"ckpt_name": "model.safetensors"}},
            "3": {"class_type": "KSampler", "inputs": {
                "model": ["4", 0],
                "positive": [6, 0],
                "negative": ["", 0],
                "seed": 42,
                "steps": 20
            }},
            "9": {"class_type": "SaveImage", "inputs": {"images": {"link_id": "3"}}}
        }))
        .unwrap()
    }

    #[test]
    fn test_input_sources() {
        let prompt = sample();
        assert_eq!(prompt.input_sources("3"), vec!["4", "6"]);
        assert_eq!(prompt.input_sources("9"), vec!["3"]);
        assert!(prompt.input_sources("4").is_empty());
        assert!(prompt.input_sources("missing").is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let prompt = sample();
        assert_eq!(prompt.ids().collect::<Vec<_>>(), vec!["4", "3", "9"]);
        let kept = prompt.retain_ids(|id| id != "3");
        assert_eq!(kept.ids().collect::<Vec<_>>(), vec!["4", "9"]);
    }

    #[test]
    fn test_rejects_non_object_prompt() {
        let err = Prompt::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_randomize_seeds_skips_linked_seeds() {
        let mut prompt = Prompt::from_value(json!({
            "1": {"class_type": "KSampler", "inputs": {"seed": 1}},
            "2": {"class_type": "KSamplerAdvanced", "inputs": {"noise_seed": 5, "seed": ["7", 0]}},
            "3": {"class_type": "SaveImage", "inputs": {}}
        }))
        .unwrap();

        let changed = prompt.randomize_seeds(&mut rand::thread_rng());
        assert_eq!(changed, 2);
        assert_eq!(prompt.get("2").unwrap()["inputs"]["seed"], json!(["7", 0]));
        assert!(prompt.get("1").unwrap()["inputs"]["seed"].is_u64());
    }

    #[test]
    fn test_submission_wire_format() {
        let submission = PromptSubmission::tagged(sample());
        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(value["extra_data"]["isGroupExecutorRequest"], json!(true));
        assert!(value.get("client_id").is_none());

        let untagged = serde_json::to_value(PromptSubmission::new(Prompt::new())).unwrap();
        assert_eq!(untagged["extra_data"], json!({}));

        let parsed: PromptSubmission = serde_json::from_value(json!({
            "prompt": {},
            "extra_data": {"isGroupExecutorRequest": true, "extra_pnginfo": {"a": 1}}
        }))
        .unwrap();
        assert!(parsed.is_tagged());
        assert_eq!(parsed.extra_data.other["extra_pnginfo"], json!({"a": 1}));
    }
}
