//! Per-object feature summaries

use serde::{Deserialize, Serialize};

use crate::point::{Point3f, Vector3f};

/// Number of scalar features exposed by [`CharacteristicsVector::features`]
pub const FEATURE_COUNT: usize = 12;

/// Human readable names of the flattened features, in [`CharacteristicsVector::features`] order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "extent_x",
    "extent_y",
    "extent_z",
    "centroid_x",
    "centroid_y",
    "centroid_z",
    "point_count",
    "density",
    "mean_reflectivity",
    "shape_major",
    "shape_middle",
    "shape_minor",
];

/// Fixed-shape numeric description of one scanned object.
///
/// `density` is `point_count / bounding volume`. A populated object with a
/// zero-volume bounding box (identical or coplanar points) reports
/// `f32::INFINITY`; an empty object reports `0.0`.
///
/// `shape` holds the eigenvalues of the point covariance matrix sorted in
/// descending order and normalized to sum to one, so it is independent of
/// both scale and point count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicsVector {
    pub point_count: usize,
    pub min: Point3f,
    pub max: Point3f,
    pub extents: Vector3f,
    pub centroid: Point3f,
    #[serde(with = "unbounded_density")]
    pub density: f32,
    pub mean_reflectivity: f32,
    pub shape: [f32; 3],
}

/// JSON has no infinity; an unbounded density is stored as `null`.
mod unbounded_density {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(density: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if density.is_finite() {
            serializer.serialize_f32(*density)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::INFINITY))
    }
}

impl CharacteristicsVector {
    /// The vector describing an object with no points
    pub fn empty() -> Self {
        Self {
            point_count: 0,
            min: Point3f::origin(),
            max: Point3f::origin(),
            extents: Vector3f::zeros(),
            centroid: Point3f::origin(),
            density: 0.0,
            mean_reflectivity: 0.0,
            shape: [0.0; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Volume of the axis-aligned bounding box
    pub fn bounding_volume(&self) -> f32 {
        self.extents.x * self.extents.y * self.extents.z
    }

    /// Flatten into a feature array, ordered as [`FEATURE_NAMES`]
    pub fn features(&self) -> [f32; FEATURE_COUNT] {
        [
            self.extents.x,
            self.extents.y,
            self.extents.z,
            self.centroid.x,
            self.centroid.y,
            self.centroid.z,
            self.point_count as f32,
            self.density,
            self.mean_reflectivity,
            self.shape[0],
            self.shape[1],
            self.shape[2],
        ]
    }
}

impl Default for CharacteristicsVector {
    fn default() -> Self {
        Self::empty()
    }
}
