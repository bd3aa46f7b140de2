#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_cloud::memory::MemoryStore;
use relay_comfyui::executor::{ExecutorError, WorkflowExecutor};
use relay_comfyui::history::ImageRef;
use relay_comfyui::processor::ProcessorError;
use relay_core::workflow::Workflow;
use relay_worker::handler::HandlerContext;
use serde_json::json;

pub const PUBLIC_BASE: &str = "https://cdn.example.com";

/// A workflow submission captured by [`FakeExecutor`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub workflow: serde_json::Value,
    pub output_node_id: String,
}

/// Scripted stand-in for ComfyUI.
#[derive(Default)]
pub struct FakeExecutor {
    images: Vec<ImageRef>,
    fail: bool,
    delay: Duration,
    submissions: Mutex<Vec<Submission>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeExecutor {
    /// Every run yields the given image filenames.
    pub fn with_images(filenames: &[&str]) -> Self {
        Self::with_records(filenames.iter().map(|f| ImageRef::new(*f)).collect())
    }

    pub fn with_records(images: Vec<ImageRef>) -> Self {
        Self {
            images,
            ..Default::default()
        }
    }

    /// Every run fails with a node exception.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Like [`FakeExecutor::with_images`], but each run takes `delay`.
    pub fn slow(filenames: &[&str], delay: Duration) -> Self {
        Self {
            delay,
            ..Self::with_images(filenames)
        }
    }

    /// Most runs observed executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowExecutor for FakeExecutor {
    async fn queue_prompt_and_get_images(
        &self,
        workflow: &Workflow,
        output_node_id: &str,
    ) -> Result<Vec<ImageRef>, ExecutorError> {
        self.submissions.lock().unwrap().push(Submission {
            workflow: workflow.clone().into_value(),
            output_node_id: output_node_id.to_string(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(ProcessorError::ExecutionFailed {
                node_id: "75".into(),
                exception_type: "RuntimeError".into(),
                message: "CUDA out of memory".into(),
            }
            .into());
        }
        Ok(self.images.clone())
    }

    async fn get_image(&self, image: &ImageRef) -> Result<Vec<u8>, ExecutorError> {
        let filename = image
            .filename
            .as_deref()
            .ok_or(ExecutorError::MissingFilename)?;
        Ok(format!("bytes:{filename}").into_bytes())
    }
}

/// The template used across tests: prompt nodes 6/7, sampler 75, seed
/// generator 94, and a SaveImage node 9.
pub fn template() -> Workflow {
    Workflow::from_value(json!({
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "template prompt"}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "template negative"}},
        "75": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 20}},
        "94": {"class_type": "Seed Generator", "inputs": {"seed": 2}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI"}}
    }))
    .unwrap()
}

/// Build a context over the given fakes.
pub fn context(
    template: Option<Workflow>,
    executor: Arc<FakeExecutor>,
    store: Arc<MemoryStore>,
) -> HandlerContext {
    HandlerContext::new(template, executor, store)
}
