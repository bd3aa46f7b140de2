//! ComfyUI API-format workflow model and input patching.
//!
//! A workflow is a JSON object mapping node ids to node records of the
//! form `{"class_type": "...", "inputs": {...}}`.  Jobs may override a
//! small, fixed set of inputs on well-known node ids; every other part of
//! the graph is passed through untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::job::{JobInput, Seed};

// ---------------------------------------------------------------------------
// Well-known node ids
// ---------------------------------------------------------------------------

/// CLIPTextEncode node carrying the positive prompt.
pub const POSITIVE_PROMPT_NODE: &str = "6";

/// CLIPTextEncode node carrying the negative prompt.
pub const NEGATIVE_PROMPT_NODE: &str = "7";

/// Seed generator node. Preferred target for a seed override.
pub const SEED_GENERATOR_NODE: &str = "94";

/// Sampler node. Receives the seed only when there is no seed generator.
pub const SAMPLER_NODE: &str = "75";

/// Input field holding prompt text on CLIPTextEncode nodes.
pub const TEXT_INPUT: &str = "text";

/// Input field holding the noise seed.
pub const SEED_INPUT: &str = "seed";

/// Class type of the node whose images are published.
pub const SAVE_IMAGE_CLASS: &str = "SaveImage";

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// An API-format ComfyUI workflow graph.
///
/// Node order follows the source document, so lookups that pick "the
/// first" matching node are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow(Map<String, Value>);

/// Which job overrides were written into a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Positive prompt was written to node 6.
    pub prompt: bool,
    /// A positive prompt was supplied but node 6 could not take it.
    pub prompt_skipped: bool,
    /// Negative prompt was written to node 7.
    pub negative_prompt: bool,
    /// Node that received the seed, if any.
    pub seed_node: Option<&'static str>,
}

impl Workflow {
    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::Validation(format!(
                "Workflow must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Read and parse a workflow template from disk.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Io(format!("{}: {e}", path.display())))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Validation(format!("{}: {e}", path.display())))?;
        Self::from_value(value)
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw record for a node id.
    pub fn node(&self, node_id: &str) -> Option<&Value> {
        self.0.get(node_id)
    }

    /// Class type tag of a node, if the node exists and carries one.
    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.node(node_id)?.get("class_type")?.as_str()
    }

    /// Current value of `inputs[input]` on a node.
    pub fn input(&self, node_id: &str, input: &str) -> Option<&Value> {
        self.node(node_id)?.get("inputs")?.get(input)
    }

    /// Whether `node_id` exists and has an `inputs` object.
    pub fn has_inputs(&self, node_id: &str) -> bool {
        self.node(node_id)
            .and_then(|node| node.get("inputs"))
            .is_some_and(Value::is_object)
    }

    /// Overwrite `inputs[input]` on `node_id`.
    ///
    /// Only writes when the node exists and already has an `inputs`
    /// object; never creates nodes or input maps.  Returns whether the
    /// value was written.
    pub fn set_input(&mut self, node_id: &str, input: &str, value: Value) -> bool {
        let Some(inputs) = self
            .0
            .get_mut(node_id)
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut)
        else {
            return false;
        };
        inputs.insert(input.to_string(), value);
        true
    }

    /// Id of the first node, in document order, with the given class type.
    pub fn find_output_node(&self, class_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, node)| node.get("class_type").and_then(Value::as_str) == Some(class_type))
            .map(|(id, _)| id.as_str())
    }

    /// Write the job's prompt, negative prompt, and seed overrides.
    ///
    /// - `prompt` goes to node 6 `text`.
    /// - `negative_prompt` goes to node 7 `text`.
    /// - `seed` goes to node 94 `seed`, or node 75 `seed` when 94 is absent.
    ///
    /// Missing target nodes are skipped.
    pub fn apply_overrides(&mut self, input: &JobInput) -> PatchReport {
        let mut report = PatchReport::default();

        if let Some(prompt) = &input.prompt {
            report.prompt =
                self.set_input(POSITIVE_PROMPT_NODE, TEXT_INPUT, Value::from(prompt.as_str()));
            report.prompt_skipped = !report.prompt;
        }

        if let Some(negative) = &input.negative_prompt {
            report.negative_prompt = self.set_input(
                NEGATIVE_PROMPT_NODE,
                TEXT_INPUT,
                Value::from(negative.as_str()),
            );
        }

        if let Some(seed) = input.seed {
            report.seed_node = self.apply_seed(seed);
        }

        report
    }

    fn apply_seed(&mut self, seed: Seed) -> Option<&'static str> {
        let target = if self.has_inputs(SEED_GENERATOR_NODE) {
            SEED_GENERATOR_NODE
        } else if self.has_inputs(SAMPLER_NODE) {
            SAMPLER_NODE
        } else {
            return None;
        };
        self.set_input(target, SEED_INPUT, Value::from(seed.value()))
            .then_some(target)
    }

    /// Borrow the graph as a JSON object for submission.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
