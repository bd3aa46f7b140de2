//! Domain types shared by the relay worker crates.
//!
//! Holds the ComfyUI workflow model and its input-patching rules, the job
//! payload types exchanged with the host platform, and the naming rules
//! used when republishing generated images to object storage.

pub mod error;
pub mod job;
pub mod naming;
pub mod workflow;
