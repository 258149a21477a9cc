//! Core data structures and traits for lbad
//!
//! This crate provides the fundamental types shared by every stage of the
//! detection pipeline: sensor points, frames, characteristics vectors, models,
//! configuration, and the capability traits that connect the stages.

pub mod point;
pub mod point_cloud;
pub mod characteristics;
pub mod model;
pub mod config;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use characteristics::*;
pub use model::*;
pub use config::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};
