//! Job intake from the serverless platform's HTTP job queue.
//!
//! The worker long-polls a job-take URL, runs each job through
//! [`handle_job`], and posts the result to a job-done URL.  One job is in
//! flight at a time.

use std::time::Duration;

use relay_comfyui::backoff::{next_delay, BackoffConfig};
use relay_core::job::{Job, JobOutput};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::handler::{handle_job, HandlerContext};

/// Placeholder substituted in the webhook URLs.
const ID_PLACEHOLDER: &str = "$ID";

/// Errors talking to the job queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Job queue returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed job payload ({error}): {body}")]
    Decode { error: String, body: String },
}

/// Body posted to the job-done URL.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum DoneBody<'a> {
    Output { output: &'a JobOutput },
    Error { error: &'a str },
}

impl<'a> DoneBody<'a> {
    fn from_output(output: &'a JobOutput) -> Self {
        match output.error_message() {
            Some(error) => Self::Error { error },
            None => Self::Output { output },
        }
    }
}

/// HTTP client for the job-take / job-done endpoints.
pub struct JobQueue {
    http: reqwest::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn take_url(&self) -> String {
        self.config
            .get_job_url
            .replace(ID_PLACEHOLDER, &self.config.worker_id)
    }

    fn done_url(&self, job_id: &str) -> String {
        let url = self.config.post_output_url.replace(ID_PLACEHOLDER, job_id);
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}isStream=false")
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, key),
            None => request,
        }
    }

    /// Ask for the next job. `Ok(None)` means the queue is empty.
    pub async fn take_job(&self) -> Result<Option<Job>, QueueError> {
        let response = self.authorize(self.http.get(self.take_url())).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(QueueError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&body) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // The platform considers this job delivered; it will not be reported.
                tracing::error!(error = %e, body = %body, "Dropping undecodable job");
                Err(QueueError::Decode {
                    error: e.to_string(),
                    body,
                })
            }
        }
    }

    /// Report a finished job.
    pub async fn post_output(&self, job_id: &str, output: &JobOutput) -> Result<(), QueueError> {
        let response = self
            .authorize(self.http.post(self.done_url(job_id)))
            .json(&DoneBody::from_output(output))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(QueueError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Pull and run jobs until `cancel` fires.
///
/// An in-flight job always finishes and is reported before the loop
/// checks for cancellation again.  Queue errors back off exponentially.
pub async fn run(queue: &JobQueue, ctx: &HandlerContext, cancel: &CancellationToken) {
    let backoff = BackoffConfig::default();
    let mut error_delay = backoff.initial_delay;

    tracing::info!(worker_id = %queue.config().worker_id, "Job queue loop started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.take_job() => next,
        };

        match next {
            Ok(Some(job)) => {
                error_delay = backoff.initial_delay;
                tracing::info!(job_id = %job.id, "Job received");

                let output = handle_job(ctx, &job.id, job.input).await;
                match queue.post_output(&job.id, &output).await {
                    Ok(()) => tracing::info!(
                        job_id = %job.id,
                        failed = output.is_error(),
                        "Job result reported",
                    ),
                    Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to report job result"),
                }
            }
            Ok(None) => {
                if !pause(queue.config().poll_interval, cancel).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_in_ms = error_delay.as_millis() as u64,
                    "Failed to take job",
                );
                if !pause(error_delay, cancel).await {
                    break;
                }
                error_delay = next_delay(error_delay, &backoff);
            }
        }
    }

    tracing::info!("Job queue loop stopped");
}

/// Sleep for `delay`; returns `false` if cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn queue(get: &str, post: &str) -> JobQueue {
        JobQueue::new(QueueConfig {
            get_job_url: get.into(),
            post_output_url: post.into(),
            api_key: None,
            worker_id: "pod-1".into(),
            poll_interval: Duration::from_millis(10),
        })
    }

    #[test]
    fn urls_substitute_ids() {
        let q = queue("https://api.example.com/job-take/$ID", "https://api.example.com/job-done/$ID");
        assert_eq!(q.take_url(), "https://api.example.com/job-take/pod-1");
        assert_eq!(q.done_url("job-9"), "https://api.example.com/job-done/job-9?isStream=false");
    }

    #[test]
    fn done_url_appends_to_existing_query() {
        let q = queue("http://x/$ID", "http://x/done/$ID?gpu=a100");
        assert_eq!(q.done_url("j"), "http://x/done/j?gpu=a100&isStream=false");
    }

    #[test]
    fn done_body_splits_errors_from_output() {
        let ok = JobOutput::images(vec!["https://cdn/a.png".into()]);
        assert_eq!(
            serde_json::to_value(DoneBody::from_output(&ok)).unwrap(),
            json!({"output": {"images": ["https://cdn/a.png"]}})
        );

        let failed = JobOutput::error("boom");
        assert_eq!(
            serde_json::to_value(DoneBody::from_output(&failed)).unwrap(),
            json!({"error": "boom"})
        );
    }
}
