use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use relay_cloud::{CloudError, R2Config};

/// How jobs reach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Pull jobs from the serverless platform's job queue.
    Queue,
    /// Serve a local `/runsync` HTTP API.
    Api,
    /// Run one job from a JSON file and exit.
    Local,
}

impl FromStr for WorkerMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "api" => Ok(Self::Api),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Where generated images are uploaded.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// S3-compatible bucket (R2).
    R2(R2Config),
    /// Keep uploads in memory; URLs use the given base.
    Memory { public_url_base: String },
}

/// Job queue endpoints of the serverless platform.
#[derive(Clone)]
pub struct QueueConfig {
    /// Job-take URL; `$ID` is replaced with the worker id.
    pub get_job_url: String,
    /// Job-done URL; `$ID` is replaced with the job id.
    pub post_output_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub api_key: Option<String>,
    pub worker_id: String,
    /// Pause between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("get_job_url", &self.get_job_url)
            .field("post_output_url", &self.post_output_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("worker_id", &self.worker_id)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Local HTTP API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on one `/runsync` request.
    pub request_timeout: Duration,
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub mode: WorkerMode,
    /// ComfyUI HTTP base URL.
    pub comfyui_url: String,
    /// How long one prompt may run before it is abandoned.
    pub execution_timeout: Duration,
    pub template_path: PathBuf,
    pub storage: StorageConfig,
    /// Present in `queue` mode only.
    pub queue: Option<QueueConfig>,
    pub api: ApiConfig,
    /// Job file read in `local` mode.
    pub test_input_path: PathBuf,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error(
        "REQUEST_TIMEOUT_SECS ({request_secs}) must be greater than \
         COMFYUI_TIMEOUT_SECS ({execution_secs})"
    )]
    RequestTimeoutTooShort { request_secs: u64, execution_secs: u64 },

    #[error(transparent)]
    Storage(#[from] CloudError),
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default                   |
    /// |------------------------------|---------------------------|
    /// | `RELAY_MODE`                 | `queue`                   |
    /// | `COMFYUI_URL`                | `http://127.0.0.1:8188`   |
    /// | `COMFYUI_TIMEOUT_SECS`       | `600`                     |
    /// | `WORKFLOW_TEMPLATE_PATH`     | `/root/workflow_api.json` |
    /// | `RELAY_STORAGE`              | `r2` (`r2` or `memory`)   |
    /// | `R2_*`                       | see [`R2Config`]          |
    /// | `RUNPOD_WEBHOOK_GET_JOB`     | required in `queue` mode  |
    /// | `RUNPOD_WEBHOOK_POST_OUTPUT` | required in `queue` mode  |
    /// | `RUNPOD_AI_API_KEY`          | unset                     |
    /// | `RUNPOD_POD_ID`              | `local-worker`            |
    /// | `RELAY_POLL_INTERVAL_MS`     | `1000`                    |
    /// | `HOST`                       | `0.0.0.0`                 |
    /// | `PORT`                       | `8000`                    |
    /// | `REQUEST_TIMEOUT_SECS`       | `900`                     |
    /// | `RELAY_TEST_INPUT`           | `test_input.json`         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = parse_or(&get, "RELAY_MODE", WorkerMode::Queue)?;

        let comfyui_url = get("COMFYUI_URL").unwrap_or_else(|| "http://127.0.0.1:8188".into());
        let execution_timeout =
            Duration::from_secs(parse_or(&get, "COMFYUI_TIMEOUT_SECS", 600u64)?);
        let template_path = get("WORKFLOW_TEMPLATE_PATH")
            .unwrap_or_else(|| "/root/workflow_api.json".into())
            .into();

        let storage = match get("RELAY_STORAGE").as_deref().map(str::trim) {
            None | Some("r2") => StorageConfig::R2(R2Config::from_lookup(&lookup)?),
            Some("memory") => StorageConfig::Memory {
                public_url_base: get("R2_PUBLIC_URL").unwrap_or_else(|| "memory://".into()),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "RELAY_STORAGE",
                    value: other.to_string(),
                })
            }
        };

        let queue = if mode == WorkerMode::Queue {
            Some(QueueConfig {
                get_job_url: get("RUNPOD_WEBHOOK_GET_JOB")
                    .ok_or(ConfigError::Missing("RUNPOD_WEBHOOK_GET_JOB"))?,
                post_output_url: get("RUNPOD_WEBHOOK_POST_OUTPUT")
                    .ok_or(ConfigError::Missing("RUNPOD_WEBHOOK_POST_OUTPUT"))?,
                api_key: get("RUNPOD_AI_API_KEY"),
                worker_id: get("RUNPOD_POD_ID").unwrap_or_else(|| "local-worker".into()),
                poll_interval: Duration::from_millis(parse_or(
                    &get,
                    "RELAY_POLL_INTERVAL_MS",
                    1000u64,
                )?),
            })
        } else {
            None
        };

        let api = ApiConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PORT", 8000u16)?,
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 900u64)?),
        };
        // A request dropped by the timeout layer skips the prompt cleanup
        // that runs when the execution timeout fires.
        if mode == WorkerMode::Api && api.request_timeout <= execution_timeout {
            return Err(ConfigError::RequestTimeoutTooShort {
                request_secs: api.request_timeout.as_secs(),
                execution_secs: execution_timeout.as_secs(),
            });
        }

        let test_input_path = get("RELAY_TEST_INPUT")
            .unwrap_or_else(|| "test_input.json".into())
            .into();

        Ok(Self {
            mode,
            comfyui_url,
            execution_timeout,
            template_path,
            storage,
            queue,
            api,
            test_input_path,
        })
    }
}

/// Parse `key` when set, else fall back to `default`.
fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
