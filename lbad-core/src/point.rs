//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A single sensor return: position, reflectivity and acquisition time.
///
/// Timestamps are measured on the sensor (or recording) clock and are
/// expected to be monotonic within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub position: Point3f,
    pub reflectivity: f32,
    pub timestamp: Duration,
}

impl ScanPoint {
    /// Create a new point
    pub fn new(position: Point3f, reflectivity: f32, timestamp: Duration) -> Self {
        Self {
            position,
            reflectivity,
            timestamp,
        }
    }

    /// Convenience constructor from raw coordinates and a millisecond timestamp
    pub fn from_xyz(x: f32, y: f32, z: f32, reflectivity: f32, timestamp_ms: u64) -> Self {
        Self::new(
            Point3f::new(x, y, z),
            reflectivity,
            Duration::from_millis(timestamp_ms),
        )
    }

    /// True when every coordinate and the reflectivity are finite
    pub fn is_finite(&self) -> bool {
        self.position.x.is_finite()
            && self.position.y.is_finite()
            && self.position.z.is_finite()
            && self.reflectivity.is_finite()
    }

    /// Reject points with non-finite coordinates or reflectivity
    pub fn check_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(Error::MalformedPoint(format!(
                "non-finite return ({}, {}, {}) reflectivity {} at {:?}",
                self.position.x,
                self.position.y,
                self.position.z,
                self.reflectivity,
                self.timestamp
            )))
        }
    }
}

impl Default for ScanPoint {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            reflectivity: 0.0,
            timestamp: Duration::ZERO,
        }
    }
}

impl From<ScanPoint> for Point3f {
    fn from(point: ScanPoint) -> Self {
        point.position
    }
}
