//! One-shot run of a job stored in a JSON file.
//!
//! The file uses the platform's request shape, `{"input": {...}}`, with an
//! optional `id`.

use std::path::Path;

use anyhow::Context;
use relay_core::job::JobOutput;

use crate::handler::{handle_job, HandlerContext};
use crate::serve::RunRequest;

/// Run the job in `path` and return its output.
pub async fn run_file(ctx: &HandlerContext, path: &Path) -> anyhow::Result<JobOutput> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read test input {}", path.display()))?;
    let request: RunRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse test input {}", path.display()))?;

    let id = request.id.unwrap_or_else(|| "local-test".to_string());
    tracing::info!(job_id = %id, path = %path.display(), "Running local test job");
    Ok(handle_job(ctx, &id, request.input).await)
}
