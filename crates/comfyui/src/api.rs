//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, queue removal, interruption, history
//! retrieval, output image download, and the `/system_stats` readiness
//! probe using [`reqwest`].

use serde::{Deserialize, Serialize};

/// Folder type ComfyUI uses for SaveImage results.
pub const OUTPUT_FOLDER_TYPE: &str = "output";

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i32,
}

/// Body of a `/prompt` submission.
#[derive(Serialize)]
struct PromptRequest<'a, T: Serialize + ?Sized> {
    prompt: &'a T,
    client_id: &'a str,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.  A
    ///   trailing slash is dropped.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Base HTTP URL of the instance.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID.  The client ID routes progress messages to the
    /// WebSocket opened with the same ID.
    pub async fn submit_workflow<T: Serialize + ?Sized>(
        &self,
        workflow: &T,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = PromptRequest {
            prompt: workflow,
            client_id,
        };

        let response = self
            .client
            .post(self.endpoint("prompt"))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a queued prompt.
    ///
    /// Sends a `POST /queue` request asking ComfyUI to delete the
    /// specified prompt.  Has no effect on a prompt that already started.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(self.endpoint("queue"))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt the currently running execution immediately.
    ///
    /// Sends a `POST /interrupt` request.  This does not target a
    /// specific prompt -- it interrupts whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self.client.post(self.endpoint("interrupt")).send().await?;

        Self::check_status(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request.  The returned JSON is
    /// keyed by prompt id and contains per-node outputs.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint(&format!("history/{prompt_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a generated file.
    ///
    /// Sends `GET /view?filename=..&subfolder=..&type=..` and returns the
    /// raw bytes.
    pub async fn get_image(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint("view"))
            .query(&view_query(filename, subfolder, folder_type))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch `GET /system_stats`. Succeeds once the server is serving.
    pub async fn system_stats(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self.client.get(self.endpoint("system_stats")).send().await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Query pairs for `/view`. An empty folder type means "output".
fn view_query<'a>(
    filename: &'a str,
    subfolder: &'a str,
    folder_type: &'a str,
) -> [(&'static str, &'a str); 3] {
    let folder_type = if folder_type.is_empty() {
        OUTPUT_FOLDER_TYPE
    } else {
        folder_type
    };
    [
        ("filename", filename),
        ("subfolder", subfolder),
        ("type", folder_type),
    ]
}
