use async_trait::async_trait;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// A required setting was not provided.
    #[error("Missing storage configuration: {0} is not set")]
    MissingConfig(&'static str),

    /// The upload request failed.
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// A bucket that accepts uploads and serves them at public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), CloudError>;

    /// Public URL an uploaded `key` is served from.
    fn public_url(&self, key: &str) -> String;
}
