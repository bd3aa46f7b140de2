use crate::store::CloudError;

/// Region R2 expects; it ignores the value but SigV4 needs one.
pub const DEFAULT_REGION: &str = "auto";

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Base the bucket is publicly served from, e.g. `https://cdn.example.com`.
    pub public_url_base: String,
    pub region: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("public_url_base", &self.public_url_base)
            .field("region", &self.region)
            .finish()
    }
}

impl R2Config {
    /// Load settings from the process environment.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `R2_ENDPOINT_URL`      | (required) |
    /// | `R2_ACCESS_KEY_ID`     | (required) |
    /// | `R2_SECRET_ACCESS_KEY` | (required) |
    /// | `R2_BUCKET_NAME`       | (required) |
    /// | `R2_PUBLIC_URL`        | (required) |
    /// | `R2_REGION`            | `auto`     |
    pub fn from_env() -> Result<Self, CloudError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CloudError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(CloudError::MissingConfig(key));

        Ok(Self {
            endpoint_url: require("R2_ENDPOINT_URL")?,
            access_key_id: require("R2_ACCESS_KEY_ID")?,
            secret_access_key: require("R2_SECRET_ACCESS_KEY")?,
            bucket: require("R2_BUCKET_NAME")?,
            public_url_base: require("R2_PUBLIC_URL")?,
            region: get("R2_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        })
    }
}
