//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection management,
//! HTTP API wrappers, readiness backoff, history parsing, and the
//! [`executor::ComfyUIExecutor`] that runs one workflow end to end.

pub mod api;
pub mod backoff;
pub mod client;
pub mod executor;
pub mod history;
pub mod messages;
pub mod processor;
