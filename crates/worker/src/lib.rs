//! Job worker that runs ComfyUI workflows and republishes their images.
//!
//! [`handler::handle_job`] is the unit of work.  [`queue`], [`serve`],
//! and [`local`] are the three ways jobs reach it.

pub mod config;
pub mod handler;
pub mod local;
pub mod queue;
pub mod serve;
