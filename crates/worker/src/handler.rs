//! The job handler: patch a workflow, run it on ComfyUI, publish images.
//!
//! Every job goes through [`handle_job`], which never fails: precondition
//! violations return fixed error strings and any other failure is folded
//! into `{"error": "Error processing request: ..."}`.

use std::path::Path;
use std::sync::Arc;

use relay_cloud::{CloudError, ObjectStore};
use relay_comfyui::executor::{ExecutorError, WorkflowExecutor};
use relay_core::error::CoreError;
use relay_core::job::{JobInput, JobOutput};
use relay_core::naming::{content_type_for, unique_object_key};
use relay_core::workflow::{Workflow, POSITIVE_PROMPT_NODE, SAVE_IMAGE_CLASS};
use tokio::sync::Mutex;

/// Returned when there is neither an override nor a template.
pub const NO_WORKFLOW_ERROR: &str = "No workflow provided and no template found.";

/// Returned when the workflow has no `SaveImage` node.
pub const NO_OUTPUT_NODE_ERROR: &str = "Workflow must contain a 'SaveImage' node.";

/// Returned when ComfyUI produced no images in time.
pub const NO_OUTPUT_ERROR: &str = "Execution timed out or generated no output.";

/// Prefix for failures caught by the outer wrapper.
pub const PROCESSING_ERROR_PREFIX: &str = "Error processing request";

/// Process-lifetime collaborators shared by every job.
pub struct HandlerContext {
    template: Option<Workflow>,
    executor: Arc<dyn WorkflowExecutor>,
    store: Arc<dyn ObjectStore>,
    /// Held for the whole of a job; ComfyUI's `/interrupt` is server-wide.
    running: Mutex<()>,
}

impl HandlerContext {
    pub fn new(
        template: Option<Workflow>,
        executor: Arc<dyn WorkflowExecutor>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            template,
            executor,
            store,
            running: Mutex::new(()),
        }
    }

    pub fn template(&self) -> Option<&Workflow> {
        self.template.as_ref()
    }
}

/// Failures caught by the outer wrapper of [`handle_job`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Input(#[from] CoreError),

    #[error(transparent)]
    Execution(#[from] ExecutorError),

    #[error(transparent)]
    Storage(#[from] CloudError),
}

/// Load the workflow template, logging instead of failing.
///
/// A missing or malformed template is not fatal: jobs can still supply
/// their own workflow.
pub fn load_template(path: &Path) -> Option<Workflow> {
    match Workflow::load(path) {
        Ok(template) => {
            tracing::info!(
                path = %path.display(),
                nodes = template.len(),
                "Loaded workflow template",
            );
            Some(template)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to load workflow template");
            None
        }
    }
}

/// Run one job and produce the output returned to the host.
///
/// Concurrent callers are queued; one job runs at a time.
pub async fn handle_job(ctx: &HandlerContext, job_id: &str, input: serde_json::Value) -> JobOutput {
    let _running = ctx.running.lock().await;
    match process(ctx, job_id, input).await {
        Ok(output) => {
            if let Some(message) = output.error_message() {
                tracing::warn!(job_id, error = message, "Job rejected");
            }
            output
        }
        Err(e) => {
            tracing::error!(job_id, error = %e, "Handler error");
            JobOutput::error(format!("{PROCESSING_ERROR_PREFIX}: {e}"))
        }
    }
}

async fn process(
    ctx: &HandlerContext,
    job_id: &str,
    input: serde_json::Value,
) -> Result<JobOutput, HandlerError> {
    let input = JobInput::from_value(input)?;

    // 1. Pick the workflow.
    let mut workflow = match (input.workflow_override()?, ctx.template()) {
        (Some(workflow), _) => {
            tracing::debug!(job_id, nodes = workflow.len(), "Using workflow override");
            workflow
        }
        (None, Some(template)) => template.clone(),
        (None, None) => return Ok(JobOutput::error(NO_WORKFLOW_ERROR)),
    };

    // 2. Inject inputs.
    let report = workflow.apply_overrides(&input);
    if report.prompt_skipped {
        tracing::warn!(
            job_id,
            node_id = POSITIVE_PROMPT_NODE,
            "Positive prompt node not found in workflow, skipping prompt injection",
        );
    }
    tracing::debug!(
        job_id,
        prompt = report.prompt,
        negative_prompt = report.negative_prompt,
        seed_node = ?report.seed_node,
        "Applied job overrides",
    );

    // 3. Locate the output node.
    let Some(output_node_id) = workflow.find_output_node(SAVE_IMAGE_CLASS).map(str::to_owned)
    else {
        return Ok(JobOutput::error(NO_OUTPUT_NODE_ERROR));
    };

    // 4. Execute.
    let images = ctx
        .executor
        .queue_prompt_and_get_images(&workflow, &output_node_id)
        .await?;
    if images.is_empty() {
        return Ok(JobOutput::error(NO_OUTPUT_ERROR));
    }

    // 5. Publish.
    let mut urls = Vec::with_capacity(images.len());
    for image in &images {
        let Some(filename) = image.filename.as_deref() else {
            tracing::debug!(job_id, "Skipping output record without filename");
            continue;
        };

        let bytes = ctx.executor.get_image(image).await?;
        let key = unique_object_key(filename);
        ctx.store
            .put_object(&key, bytes, content_type_for(filename))
            .await?;

        let url = ctx.store.public_url(&key);
        tracing::info!(job_id, key = %key, url = %url, "Published image");
        urls.push(url);
    }

    Ok(JobOutput::images(urls))
}
