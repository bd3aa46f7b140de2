//! Job payloads exchanged with the hosting platform.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::workflow::Workflow;

/// A unit of work delivered by the host.
///
/// `input` is kept as raw JSON so that malformed fields surface as a job
/// error rather than a rejected delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub input: Value,
}

/// Recognised fields of a job's `input` object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobInput {
    /// Full workflow override, used verbatim when non-empty.
    #[serde(default)]
    pub workflow: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<Seed>,
}

impl JobInput {
    /// Parse a job's raw `input`. `null` is treated as an empty input.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| CoreError::Validation(format!("Invalid job input: {e}")))
    }

    /// The workflow override, if one was supplied.
    ///
    /// Null, `false`, `0`, and empty strings, arrays, or objects count as
    /// "not supplied".  Any other non-object value is rejected.
    pub fn workflow_override(&self) -> Result<Option<Workflow>, CoreError> {
        match &self.workflow {
            Some(value) if is_truthy(value) => Workflow::from_value(value.clone()).map(Some),
            _ => Ok(None),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// A noise seed. Accepts a JSON integer or a string holding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SeedRepr", into = "u64")]
pub struct Seed(u64);

impl Seed {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<Seed> for u64 {
    fn from(seed: Seed) -> Self {
        seed.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedRepr {
    Number(serde_json::Number),
    Text(String),
}

impl TryFrom<SeedRepr> for Seed {
    type Error = String;

    fn try_from(repr: SeedRepr) -> Result<Self, Self::Error> {
        match repr {
            SeedRepr::Number(n) => n
                .as_u64()
                .map(Seed)
                .ok_or_else(|| format!("seed must be a non-negative integer, got {n}")),
            SeedRepr::Text(s) => s
                .trim()
                .parse::<u64>()
                .map(Seed)
                .map_err(|_| format!("seed must be a non-negative integer, got {s:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Result returned to the host for one job.
///
/// Serializes as `{"images": [...]}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Images { images: Vec<String> },
    Error { error: String },
}

impl JobOutput {
    pub fn images(urls: Vec<String>) -> Self {
        Self::Images { images: urls }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The error message, when this is an error output.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Images { .. } => None,
        }
    }
}
