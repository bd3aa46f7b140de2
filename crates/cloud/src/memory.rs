//! In-memory [`ObjectStore`] for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::naming::public_url;

use crate::store::{CloudError, ObjectStore};

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Keeps uploads in a map. Can be told to fail every upload.
#[derive(Debug, Default)]
pub struct MemoryStore {
    public_url_base: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_uploads: bool,
}

impl MemoryStore {
    pub fn new(public_url_base: impl Into<String>) -> Self {
        Self {
            public_url_base: public_url_base.into(),
            ..Default::default()
        }
    }

    /// A store whose uploads always fail.
    pub fn failing(public_url_base: impl Into<String>) -> Self {
        Self {
            fail_uploads: true,
            ..Self::new(public_url_base)
        }
    }

    /// Snapshot of everything stored so far, ordered by key.
    pub fn objects(&self) -> BTreeMap<String, StoredObject> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), CloudError> {
        if self.fail_uploads {
            return Err(CloudError::Upload(format!("{key}: store is read-only")));
        }
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| CloudError::Upload("memory store lock poisoned".into()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        public_url(&self.public_url_base, key)
    }
}
