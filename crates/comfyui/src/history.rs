//! Reading output images out of a `/history/{prompt_id}` response.

use serde::{Deserialize, Serialize};

use crate::api::OUTPUT_FOLDER_TYPE;

/// One image record as listed under a node's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Records without a filename are skipped by consumers.
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    OUTPUT_FOLDER_TYPE.to_string()
}

impl ImageRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            subfolder: String::new(),
            folder_type: default_folder_type(),
        }
    }
}

/// Images produced by `node_id` for `prompt_id`.
///
/// Looks up `history[prompt_id].outputs[node_id].images`.  Any missing
/// level yields an empty list; malformed records are dropped.
pub fn extract_images(history: &serde_json::Value, prompt_id: &str, node_id: &str) -> Vec<ImageRef> {
    let Some(images) = history
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .and_then(|outputs| outputs.get(node_id))
        .and_then(|node| node.get("images"))
        .and_then(serde_json::Value::as_array)
    else {
        return Vec::new();
    };

    images
        .iter()
        .filter_map(|image| match serde_json::from_value::<ImageRef>(image.clone()) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(prompt_id, node_id, error = %e, "Skipping malformed image record");
                None
            }
        })
        .collect()
}
