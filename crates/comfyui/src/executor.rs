//! Run a single workflow on ComfyUI and collect its output images.
//!
//! [`WorkflowExecutor`] is the seam the job handler depends on;
//! [`ComfyUIExecutor`] implements it against a live server by opening a
//! WebSocket, submitting the prompt under the socket's client ID, waiting
//! for completion, and reading the output node from `/history`.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::workflow::Workflow;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::backoff::{wait_until_ready, BackoffConfig};
use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::history::{extract_images, ImageRef};
use crate::processor::{wait_for_completion, ProcessorError};

/// Default upper bound on one prompt's execution.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Executes workflows and fetches the images they produce.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    /// Run `workflow` and return the images listed under `output_node_id`.
    ///
    /// An empty list means the run timed out or produced nothing.
    async fn queue_prompt_and_get_images(
        &self,
        workflow: &Workflow,
        output_node_id: &str,
    ) -> Result<Vec<ImageRef>, ExecutorError>;

    /// Download the bytes of one output image.
    async fn get_image(&self, image: &ImageRef) -> Result<Vec<u8>, ExecutorError>;
}

/// Errors from running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Connect(#[from] ComfyUIClientError),

    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error(transparent)]
    Execution(#[from] ProcessorError),

    #[error("Image record has no filename")]
    MissingFilename,
}

/// [`WorkflowExecutor`] backed by one ComfyUI server.
pub struct ComfyUIExecutor {
    api: ComfyUIApi,
    client: ComfyUIClient,
    timeout: Duration,
}

impl ComfyUIExecutor {
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    /// * `timeout` - how long to wait for a prompt before giving up.
    pub fn new(api_url: &str, timeout: Duration) -> Self {
        Self {
            api: ComfyUIApi::new(api_url),
            client: ComfyUIClient::new(api_url),
            timeout,
        }
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// Block until the server answers `/system_stats`, with backoff.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> bool {
        wait_until_ready(&self.api, &BackoffConfig::default(), cancel).await
    }

    /// Best-effort cleanup after a timeout: drop the prompt from the queue
    /// and stop whatever is running.
    async fn abandon(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id, error = %e, "Failed to remove prompt from queue");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id, error = %e, "Failed to interrupt execution");
        }
    }
}

#[async_trait]
impl WorkflowExecutor for ComfyUIExecutor {
    async fn queue_prompt_and_get_images(
        &self,
        workflow: &Workflow,
        output_node_id: &str,
    ) -> Result<Vec<ImageRef>, ExecutorError> {
        // Connect before submitting so the completion frame cannot be missed.
        let mut conn = self.client.connect().await?;

        let submitted = self.api.submit_workflow(workflow, &conn.client_id).await?;
        let prompt_id = submitted.prompt_id;
        tracing::info!(
            prompt_id = %prompt_id,
            queue_number = submitted.number,
            output_node_id,
            "Workflow submitted to ComfyUI",
        );

        let waited = tokio::time::timeout(
            self.timeout,
            wait_for_completion(&mut conn.ws_stream, &prompt_id),
        )
        .await;
        if let Err(e) = conn.ws_stream.close(None).await {
            tracing::debug!(prompt_id = %prompt_id, error = %e, "Failed to close ComfyUI WebSocket");
        }

        match waited {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    prompt_id = %prompt_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Timed out waiting for ComfyUI",
                );
                self.abandon(&prompt_id).await;
                return Ok(Vec::new());
            }
        }

        let history = self.api.get_history(&prompt_id).await?;
        let images = extract_images(&history, &prompt_id, output_node_id);
        tracing::info!(prompt_id = %prompt_id, count = images.len(), "Collected output images");
        Ok(images)
    }

    async fn get_image(&self, image: &ImageRef) -> Result<Vec<u8>, ExecutorError> {
        let filename = image
            .filename
            .as_deref()
            .ok_or(ExecutorError::MissingFilename)?;
        let bytes = self
            .api
            .get_image(filename, &image.subfolder, &image.folder_type)
            .await?;
        tracing::debug!(filename, bytes = bytes.len(), "Fetched output image");
        Ok(bytes)
    }
}
