//! # lbad Algorithms
//!
//! The synchronous stages of the detection pipeline.
//!
//! This crate separates static background from the scanned object, buckets
//! object points into fixed-duration frames, and summarizes each frame into a
//! characteristics vector.

pub mod background;
pub mod frame;
pub mod characterization;

// Re-export commonly used items
pub use background::*;
pub use frame::*;
pub use characterization::*;
