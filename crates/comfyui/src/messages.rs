//! Frames pushed by ComfyUI over `/ws`.
//!
//! Every text frame is `{"type": "<kind>", "data": {...}}`. Only the
//! fields needed to follow one prompt to completion are decoded; the
//! rest of each payload is ignored.

use serde::Deserialize;

/// A text frame from the ComfyUI WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Queue broadcast, not tied to a prompt.
    Status(serde_json::Value),
    ExecutionStart(PromptRef),
    /// Some nodes were served from cache.
    ExecutionCached(PromptRef),
    /// `node: None` marks the end of the prompt.
    Executing(NodeRef),
    Progress(StepProgress),
    Executed(NodeRef),
    ExecutionError(NodeFailure),
    ExecutionInterrupted(Interruption),
    /// Sent by newer servers after the final `executing` frame.
    ExecutionSuccess(PromptRef),
}

impl ServerMessage {
    /// Decode one text frame. Unknown `type` values are an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Prompt this frame belongs to, when the payload names one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::Progress(data) => data.prompt_id.as_deref(),
            Self::ExecutionStart(data) | Self::ExecutionCached(data) | Self::ExecutionSuccess(data) => {
                Some(&data.prompt_id)
            }
            Self::Executing(data) | Self::Executed(data) => Some(&data.prompt_id),
            Self::ExecutionError(data) => Some(&data.prompt_id),
            Self::ExecutionInterrupted(data) => Some(&data.prompt_id),
        }
    }

    /// `status.exec_info.queue_remaining` of a status frame.
    pub fn queue_remaining(&self) -> Option<i64> {
        match self {
            Self::Status(data) => data
                .pointer("/status/exec_info/queue_remaining")
                .and_then(serde_json::Value::as_i64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeRef {
    pub prompt_id: String,
    #[serde(default)]
    pub node: Option<String>,
}

/// Sampler step counter. Older servers omit the prompt id.
#[derive(Debug, Clone, Deserialize)]
pub struct StepProgress {
    pub value: u32,
    pub max: u32,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

impl StepProgress {
    pub fn percent(&self) -> u32 {
        if self.max == 0 {
            0
        } else {
            self.value.saturating_mul(100) / self.max
        }
    }
}

/// A node raised while executing.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeFailure {
    pub prompt_id: String,
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    pub exception_type: String,
    pub exception_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interruption {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
}
