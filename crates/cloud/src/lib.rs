//! Object storage for republished images.
//!
//! [`store::ObjectStore`] is the seam the job handler uploads through.
//! [`s3::S3ObjectStore`] talks to any S3-compatible endpoint (Cloudflare
//! R2 in production); [`memory::MemoryStore`] keeps objects in memory for
//! tests and dry runs.

pub mod config;
pub mod memory;
pub mod s3;
pub mod store;

pub use config::R2Config;
pub use store::{CloudError, ObjectStore};
