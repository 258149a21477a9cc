//! Object characterization
//!
//! Summarizes the points of one object into a [`CharacteristicsVector`]:
//! axis-aligned extents, centroid, point count, density, mean reflectivity
//! and the normalized principal moments of the point distribution.

use lbad_core::{CharacteristicsVector, ObjectCharacterizer, Point3f, ScanPoint, Vector3f};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

/// Buffers the points of the current object and computes its moments
#[derive(Debug, Default)]
pub struct MomentCharacterizer {
    buffer: Vec<ScanPoint>,
}

impl MomentCharacterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Points buffered for the current object
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl ObjectCharacterizer for MomentCharacterizer {
    fn new_point(&mut self, point: ScanPoint) {
        self.buffer.push(point);
    }

    fn new_object(&mut self) {
        self.buffer.clear();
    }

    fn extract_characteristics(&mut self) -> CharacteristicsVector {
        let characteristics = characterize(&self.buffer);
        self.new_object();
        characteristics
    }
}

/// Compute the characteristics of a set of points
///
/// # Arguments
/// * `points` - Points of a single object, all with finite coordinates
///
/// # Returns
/// * `CharacteristicsVector` - [`CharacteristicsVector::empty`] for no points.
///   A zero bounding volume with at least one point gives infinite density.
///
/// # Example
/// ```rust
/// use lbad_core::ScanPoint;
/// use lbad_algorithms::characterize;
///
/// let points = vec![
///     ScanPoint::from_xyz(0.0, 0.0, 0.0, 10.0, 0),
///     ScanPoint::from_xyz(2.0, 1.0, 1.0, 30.0, 1),
/// ];
/// let cv = characterize(&points);
/// assert_eq!(cv.point_count, 2);
/// assert_eq!(cv.density, 1.0);
/// assert_eq!(cv.mean_reflectivity, 20.0);
/// ```
pub fn characterize(points: &[ScanPoint]) -> CharacteristicsVector {
    if points.is_empty() {
        return CharacteristicsVector::empty();
    }

    let first = points[0].position;
    let mut min = first;
    let mut max = first;
    let mut sum = Vector3::<f64>::zeros();
    let mut reflectivity = 0.0f64;

    for point in points {
        let p = point.position;
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);

        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);

        sum += Vector3::new(p.x as f64, p.y as f64, p.z as f64);
        reflectivity += point.reflectivity as f64;
    }

    let count = points.len() as f64;
    let centroid = sum / count;

    let mut covariance = Matrix3::<f64>::zeros();
    for point in points {
        let p = point.position;
        let d = Vector3::new(
            p.x as f64 - centroid.x,
            p.y as f64 - centroid.y,
            p.z as f64 - centroid.z,
        );
        covariance += d * d.transpose();
    }
    covariance /= count;

    let extents = max - min;
    let volume = extents.x * extents.y * extents.z;
    let density = if volume > 0.0 {
        points.len() as f32 / volume
    } else {
        f32::INFINITY
    };

    CharacteristicsVector {
        point_count: points.len(),
        min,
        max,
        extents: Vector3f::new(extents.x, extents.y, extents.z),
        centroid: Point3f::new(centroid.x as f32, centroid.y as f32, centroid.z as f32),
        density,
        mean_reflectivity: (reflectivity / count) as f32,
        shape: normalized_moments(&covariance, extents.amax() as f64),
    }
}

/// Covariance eigenvalues sorted descending and scaled to sum to one
fn normalized_moments(covariance: &Matrix3<f64>, max_extent: f64) -> [f32; 3] {
    let eigen = SymmetricEigen::new(*covariance);
    let mut eigenvalues = [
        eigen.eigenvalues[0].max(0.0),
        eigen.eigenvalues[1].max(0.0),
        eigen.eigenvalues[2].max(0.0),
    ];
    eigenvalues.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let total: f64 = eigenvalues.iter().sum();
    // Round-off from the centroid can leave a tiny variance behind for
    // coincident points; treat anything at that scale as no spread at all.
    if total <= f64::EPSILON * (1.0 + max_extent * max_extent) {
        return [0.0; 3];
    }

    [
        (eigenvalues[0] / total) as f32,
        (eigenvalues[1] / total) as f32,
        (eigenvalues[2] / total) as f32,
    ]
}
