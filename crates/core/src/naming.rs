//! Object key and public URL rules for republished images.

/// Fallback content type; ComfyUI's SaveImage node writes PNG.
pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// Build a collision-free object key: `{uuid-v4}_{filename}`.
pub fn unique_object_key(filename: &str) -> String {
    format!("{}_{filename}", uuid::Uuid::new_v4())
}

/// Join a public base URL and an object key with exactly one `/`.
pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Content type for an image filename, by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
