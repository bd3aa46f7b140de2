//! S3-compatible [`ObjectStore`] (Cloudflare R2, MinIO, AWS S3).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::RequestChecksumCalculation;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use relay_core::naming::public_url;

use crate::config::R2Config;
use crate::store::{CloudError, ObjectStore};

/// Provider name attached to the static credentials.
const CREDENTIALS_PROVIDER: &str = "relay-r2";

/// Uploads to one bucket through the AWS SDK with a custom endpoint.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url_base: String,
}

impl S3ObjectStore {
    /// Build a client from static credentials.
    ///
    /// Uses SigV4 and path-style addressing, which R2 and most
    /// self-hosted S3 servers expect.
    pub async fn connect(config: &R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint_url)
            .credentials_provider(credentials)
            .load()
            .await;

        // R2 rejects the SDK's default CRC checksums on plain uploads.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        tracing::info!(
            endpoint = %config.endpoint_url,
            bucket = %config.bucket,
            region = %config.region,
            "Object storage client configured",
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url_base: config.public_url_base.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), CloudError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| CloudError::Upload(format!("{key}: {}", DisplayErrorContext(&e))))?;

        tracing::debug!(bucket = %self.bucket, key, size, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        public_url(&self.public_url_base, key)
    }
}
