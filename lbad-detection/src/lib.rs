//! # lbad Detection
//!
//! The asynchronous half of the pipeline.
//!
//! This crate compares object characteristics against a library of known
//! models, runs that comparison on a dedicated worker thread fed through a
//! bounded handoff queue, and wires every stage together into a [`Pipeline`].

pub mod detector;
pub mod queue;
pub mod chrono;
pub mod worker;
pub mod pipeline;

// Re-export commonly used items
pub use detector::*;
pub use queue::*;
pub use chrono::*;
pub use worker::*;
pub use pipeline::*;
