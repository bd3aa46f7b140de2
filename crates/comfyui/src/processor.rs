//! WebSocket message processing loop.
//!
//! Reads raw frames from a ComfyUI WebSocket connection, parses them
//! into typed [`ServerMessage`] variants, and follows a single prompt
//! until it finishes or fails.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::messages::{NodeFailure, ServerMessage, StepProgress};

/// Why a prompt did not finish successfully.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// ComfyUI reported an exception while executing a node.
    #[error("ComfyUI execution failed at node {node_id} ({exception_type}): {message}")]
    ExecutionFailed {
        node_id: String,
        exception_type: String,
        message: String,
    },

    /// The prompt was interrupted on the server.
    #[error("ComfyUI execution was interrupted")]
    Interrupted,

    /// The socket closed before the prompt finished.
    #[error("ComfyUI WebSocket closed before the prompt finished")]
    Closed,

    /// The socket failed while reading.
    #[error("WebSocket receive error: {0}")]
    Transport(String),
}

/// Step taken after looking at one text frame.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
}

/// Consume frames until `prompt_id` completes.
///
/// Completion is signalled by an `executing` frame with `node: null` (or
/// an `execution_success` frame) for this prompt.  Frames for other
/// prompts and frames that fail to parse are logged and skipped.  Binary
/// frames carry preview images and are ignored.
pub async fn wait_for_completion<S>(stream: &mut S, prompt_id: &str) -> Result<(), ProcessorError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if handle_text_message(&text, prompt_id)? == Step::Done {
                    return Ok(());
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!(prompt_id, "Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(prompt_id, ?frame, "ComfyUI WebSocket closed");
                return Err(ProcessorError::Closed);
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(prompt_id, error = %e, "WebSocket receive error");
                return Err(ProcessorError::Transport(e.to_string()));
            }
        }
    }
    Err(ProcessorError::Closed)
}

fn handle_text_message(text: &str, prompt_id: &str) -> Result<Step, ProcessorError> {
    let msg = match ServerMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
            return Ok(Step::Continue);
        }
    };

    if let ServerMessage::Status(_) = &msg {
        tracing::debug!(queue_remaining = ?msg.queue_remaining(), "ComfyUI queue status");
        return Ok(Step::Continue);
    }

    // Progress frames from older servers carry no prompt id.
    if msg.prompt_id().is_some_and(|id| id != prompt_id) {
        return Ok(Step::Continue);
    }

    match msg {
        ServerMessage::Progress(data) => {
            handle_progress(prompt_id, &data);
            Ok(Step::Continue)
        }
        ServerMessage::ExecutionStart(_) => {
            tracing::info!(prompt_id, "Execution started");
            Ok(Step::Continue)
        }
        ServerMessage::ExecutionCached(_) => {
            tracing::debug!(prompt_id, "Execution used cache");
            Ok(Step::Continue)
        }
        ServerMessage::Executing(data) => match data.node {
            Some(node) => {
                tracing::debug!(prompt_id, node = %node, "Executing node");
                Ok(Step::Continue)
            }
            None => {
                tracing::info!(prompt_id, "Execution completed (all nodes done)");
                Ok(Step::Done)
            }
        },
        ServerMessage::ExecutionSuccess(_) => {
            tracing::info!(prompt_id, "Execution succeeded");
            Ok(Step::Done)
        }
        ServerMessage::Executed(data) => {
            tracing::debug!(prompt_id, node = ?data.node, "Node executed with output");
            Ok(Step::Continue)
        }
        ServerMessage::ExecutionError(data) => Err(execution_failed(prompt_id, data)),
        ServerMessage::ExecutionInterrupted(data) => {
            tracing::warn!(prompt_id, node_id = ?data.node_id, "Execution interrupted");
            Err(ProcessorError::Interrupted)
        }
        ServerMessage::Status(_) => Ok(Step::Continue),
    }
}

fn handle_progress(prompt_id: &str, data: &StepProgress) {
    tracing::debug!(
        prompt_id,
        value = data.value,
        max = data.max,
        percent = data.percent(),
        "Generation progress",
    );
}

fn execution_failed(prompt_id: &str, data: NodeFailure) -> ProcessorError {
    tracing::error!(
        prompt_id,
        node_id = %data.node_id,
        node_type = %data.node_type,
        error_type = %data.exception_type,
        error_message = %data.exception_message,
        "Execution error",
    );
    ProcessorError::ExecutionFailed {
        node_id: data.node_id,
        exception_type: data.exception_type,
        message: data.exception_message,
    }
}
