//! Behaviour of the job handler against scripted ComfyUI and storage fakes.

mod common;

use std::sync::Arc;

use common::{context, template, FakeExecutor, PUBLIC_BASE};
use relay_cloud::memory::MemoryStore;
use relay_comfyui::history::ImageRef;
use relay_core::job::JobOutput;
use relay_worker::handler::{
    handle_job, NO_OUTPUT_ERROR, NO_OUTPUT_NODE_ERROR, NO_WORKFLOW_ERROR,
};
use serde_json::json;

fn fakes(filenames: &[&str]) -> (Arc<FakeExecutor>, Arc<MemoryStore>) {
    (
        Arc::new(FakeExecutor::with_images(filenames)),
        Arc::new(MemoryStore::new(PUBLIC_BASE)),
    )
}

fn images(output: &JobOutput) -> &[String] {
    match output {
        JobOutput::Images { images } => images,
        JobOutput::Error { error } => panic!("Expected images, got error: {error}"),
    }
}

// ---------------------------------------------------------------------------
// Workflow selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn override_is_used_verbatim_instead_of_template() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(Some(template()), executor.clone(), store);

    let override_graph = json!({
        "1": {"class_type": "EmptyLatentImage", "inputs": {"width": 512}},
        "50": {"class_type": "SaveImage", "inputs": {"filename_prefix": "custom"}}
    });
    let output = handle_job(&ctx, "job-1", json!({ "workflow": override_graph.clone() })).await;
    assert!(!output.is_error(), "{output:?}");

    let submissions = executor.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].workflow, override_graph);
    assert_eq!(submissions[0].output_node_id, "50");
}

#[tokio::test]
async fn empty_override_falls_back_to_template() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(Some(template()), executor.clone(), store);

    handle_job(&ctx, "job-1", json!({ "workflow": {} })).await;

    assert_eq!(executor.submissions()[0].workflow, template().into_value());
}

#[tokio::test]
async fn no_override_and_no_template_is_rejected() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(None, executor.clone(), store);

    let output = handle_job(&ctx, "job-1", json!({"prompt": "a cat"})).await;

    assert_eq!(output, JobOutput::error(NO_WORKFLOW_ERROR));
    assert!(executor.submissions().is_empty());
}

// ---------------------------------------------------------------------------
// Input injection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn known_nodes_are_overwritten() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(Some(template()), executor.clone(), store);

    handle_job(
        &ctx,
        "job-1",
        json!({"prompt": "a red fox", "negative_prompt": "blurry", "seed": "77"}),
    )
    .await;

    let submitted = &executor.submissions()[0].workflow;
    assert_eq!(submitted["6"]["inputs"]["text"], "a red fox");
    assert_eq!(submitted["7"]["inputs"]["text"], "blurry");
    assert_eq!(submitted["94"]["inputs"]["seed"], 77);
    assert_eq!(submitted["75"]["inputs"]["seed"], 1);
}

#[tokio::test]
async fn template_is_not_mutated_between_jobs() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(Some(template()), executor.clone(), store);

    handle_job(&ctx, "job-1", json!({"prompt": "first"})).await;
    handle_job(&ctx, "job-2", json!({})).await;

    assert_eq!(ctx.template(), Some(&template()));
    assert_eq!(
        executor.submissions()[1].workflow["6"]["inputs"]["text"],
        "template prompt"
    );
}

#[tokio::test]
async fn missing_nodes_are_not_created() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(None, executor.clone(), store);

    let graph = json!({"9": {"class_type": "SaveImage", "inputs": {}}});
    handle_job(
        &ctx,
        "job-1",
        json!({"workflow": graph.clone(), "prompt": "x", "negative_prompt": "y", "seed": 5}),
    )
    .await;

    assert_eq!(executor.submissions()[0].workflow, graph);
}

#[tokio::test]
async fn invalid_seed_is_reported_as_processing_error() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(Some(template()), executor.clone(), store);

    let output = handle_job(&ctx, "job-1", json!({"seed": "not-a-number"})).await;

    let message = output.error_message().unwrap();
    assert!(message.starts_with("Error processing request: "), "{message}");
    assert!(message.contains("seed"), "{message}");
    assert!(executor.submissions().is_empty());
}

// ---------------------------------------------------------------------------
// Output node
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_save_image_node_is_rejected() {
    let (executor, store) = fakes(&["out.png"]);
    let ctx = context(None, executor.clone(), store);

    let output = handle_job(
        &ctx,
        "job-1",
        json!({"workflow": {"1": {"class_type": "PreviewImage", "inputs": {}}}}),
    )
    .await;

    assert_eq!(output, JobOutput::error(NO_OUTPUT_NODE_ERROR));
    assert!(executor.submissions().is_empty());
}

// ---------------------------------------------------------------------------
// Execution and publishing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn urls_are_public_base_plus_unique_key() {
    let (executor, store) = fakes(&["ComfyUI_00001_.png", "ComfyUI_00002_.png"]);
    let ctx = context(Some(template()), executor, store.clone());

    let output = handle_job(&ctx, "job-1", json!({"prompt": "a cat"})).await;
    let urls = images(&output);
    assert_eq!(urls.len(), 2);

    let objects = store.objects();
    for (url, original) in urls.iter().zip(["ComfyUI_00001_.png", "ComfyUI_00002_.png"]) {
        let key = url
            .strip_prefix(&format!("{PUBLIC_BASE}/"))
            .unwrap_or_else(|| panic!("{url} is not under {PUBLIC_BASE}"));
        let (uuid, filename) = key.split_once('_').unwrap();
        assert!(uuid::Uuid::parse_str(uuid).is_ok(), "{key}");
        assert_eq!(filename, original);

        let stored = &objects[key];
        assert_eq!(stored.bytes, format!("bytes:{original}").into_bytes());
        assert_eq!(stored.content_type, "image/png");
    }
    assert_ne!(urls[0], urls[1]);
}

#[tokio::test]
async fn records_without_filename_are_skipped() {
    let executor = Arc::new(FakeExecutor::with_records(vec![
        ImageRef {
            filename: None,
            subfolder: String::new(),
            folder_type: "output".into(),
        },
        ImageRef::new("kept.png"),
    ]));
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let ctx = context(Some(template()), executor, store.clone());

    let output = handle_job(&ctx, "job-1", json!({})).await;

    assert_eq!(images(&output).len(), 1);
    assert_eq!(store.objects().len(), 1);
}

#[tokio::test]
async fn empty_result_is_reported() {
    let (executor, store) = fakes(&[]);
    let ctx = context(Some(template()), executor, store.clone());

    let output = handle_job(&ctx, "job-1", json!({})).await;

    assert_eq!(output, JobOutput::error(NO_OUTPUT_ERROR));
    assert!(store.objects().is_empty());
}

#[tokio::test]
async fn execution_failure_is_wrapped() {
    let executor = Arc::new(FakeExecutor::failing());
    let store = Arc::new(MemoryStore::new(PUBLIC_BASE));
    let ctx = context(Some(template()), executor, store);

    let output = handle_job(&ctx, "job-1", json!({})).await;

    let message = output.error_message().unwrap();
    assert!(message.starts_with("Error processing request: "), "{message}");
    assert!(message.contains("CUDA out of memory"), "{message}");
}

#[tokio::test]
async fn upload_failure_is_wrapped() {
    let executor = Arc::new(FakeExecutor::with_images(&["out.png"]));
    let store = Arc::new(MemoryStore::failing(PUBLIC_BASE));
    let ctx = context(Some(template()), executor, store);

    let output = handle_job(&ctx, "job-1", json!({})).await;

    let message = output.error_message().unwrap();
    assert!(message.starts_with("Error processing request: Upload failed"), "{message}");
}
