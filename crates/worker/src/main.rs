use std::sync::Arc;

use relay_cloud::memory::MemoryStore;
use relay_cloud::s3::S3ObjectStore;
use relay_cloud::ObjectStore;
use relay_comfyui::executor::ComfyUIExecutor;
use relay_worker::config::{StorageConfig, WorkerConfig, WorkerMode};
use relay_worker::handler::{load_template, HandlerContext};
use relay_worker::queue::JobQueue;
use relay_worker::{local, queue, serve};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "relay_worker=debug,relay_comfyui=debug,relay_cloud=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("RELAY_LOG_JSON")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        mode = ?config.mode,
        comfyui_url = %config.comfyui_url,
        "Loaded worker configuration",
    );

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // --- Workflow template ---
    let template = load_template(&config.template_path);

    // --- ComfyUI ---
    let executor = Arc::new(ComfyUIExecutor::new(
        &config.comfyui_url,
        config.execution_timeout,
    ));
    if !executor.wait_until_ready(&cancel).await {
        tracing::info!("Shutdown requested before ComfyUI became ready");
        return Ok(());
    }

    // --- Object storage ---
    let store: Arc<dyn ObjectStore> = match &config.storage {
        StorageConfig::R2(r2) => Arc::new(S3ObjectStore::connect(r2).await),
        StorageConfig::Memory { public_url_base } => {
            tracing::warn!("Using in-memory storage; uploaded images are discarded on exit");
            Arc::new(MemoryStore::new(public_url_base.clone()))
        }
    };

    let ctx = Arc::new(HandlerContext::new(template, executor, store));

    match config.mode {
        WorkerMode::Queue => {
            let Some(queue_config) = config.queue.clone() else {
                anyhow::bail!("queue mode requires job queue configuration");
            };
            let job_queue = JobQueue::new(queue_config);
            queue::run(&job_queue, &ctx, &cancel).await;
        }
        WorkerMode::Api => {
            serve::serve(Arc::clone(&ctx), &config.api, cancel).await?;
        }
        WorkerMode::Local => {
            let output = local::run_file(&ctx, &config.test_input_path).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            if let Some(error) = output.error_message() {
                anyhow::bail!("job failed: {error}");
            }
        }
    }

    tracing::info!("Worker stopped");
    Ok(())
}

/// Cancel `token` on SIGINT (Ctrl-C) or SIGTERM.
///
/// The platform sends SIGTERM when scaling a worker down; the queue loop
/// finishes its in-flight job before exiting.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    token.cancel();
}
