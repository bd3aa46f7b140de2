//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection URLs for a single ComfyUI
//! instance.  Call [`ComfyUIClient::connect`] to establish a live
//! [`ComfyUIConnection`] over WebSocket.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// WebSocket stream type produced by [`ComfyUIClient::connect`].
pub type ComfyUIStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
    api_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the handshake.  Prompts submitted with the
    /// same ID report their progress on this socket.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: ComfyUIStream,
}

impl ComfyUIClient {
    /// Create a client from the instance's HTTP base URL.
    ///
    /// The WebSocket URL is derived by swapping the scheme
    /// (`http` -> `ws`, `https` -> `wss`).
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let ws_url = ws_url_for(&api_url);
        Self { ws_url, api_url }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Connect with a freshly generated client ID (UUID v4).
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        self.connect_with_id(&uuid::Uuid::new_v4().to_string()).await
    }

    /// Connect to the ComfyUI WebSocket endpoint under `client_id`.
    ///
    /// The ID is passed as the `clientId` query parameter so that ComfyUI
    /// can address messages back to this specific client.
    pub async fn connect_with_id(
        &self,
        client_id: &str,
    ) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::debug!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{api_url}")
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
