//! Point buffers and time-windowed frames

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A generic, arrival-ordered point container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A buffer of sensor returns
pub type ScanCloud = PointCloud<ScanPoint>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point, keeping arrival order
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Remove every point, keeping the allocation
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// A fixed-duration window of candidate-object points.
///
/// Frames are produced by the frame aggregator and moved to characterization
/// once closed; a closed frame is never reopened.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Monotonic frame number assigned at open time
    pub sequence: u64,
    /// Timestamp of the first point in the frame
    pub start: Duration,
    /// Configured frame duration
    pub duration: Duration,
    pub points: ScanCloud,
}

impl Frame {
    /// Open a frame starting at `first`
    pub fn open(sequence: u64, first: ScanPoint, duration: Duration) -> Self {
        let mut points = ScanCloud::new();
        points.push(first);
        Self {
            sequence,
            start: first.timestamp,
            duration,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True once `now` is at least `duration` past the frame start
    pub fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.start) >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_keeps_arrival_order() {
        let mut cloud = ScanCloud::new();
        for i in 0..5 {
            cloud.push(ScanPoint::from_xyz(i as f32, 0.0, 0.0, 1.0, i));
        }
        assert_eq!(cloud.len(), 5);
        let xs: Vec<f32> = cloud.iter().map(|p| p.position.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        cloud.clear();
        assert!(cloud.is_empty());
    }

    #[test]
    fn test_frame_expiry() {
        let first = ScanPoint::from_xyz(0.0, 0.0, 0.0, 1.0, 500);
        let frame = Frame::open(0, first, Duration::from_millis(100));
        assert_eq!(frame.start, Duration::from_millis(500));
        assert_eq!(frame.len(), 1);
        assert!(!frame.is_expired(Duration::from_millis(599)));
        assert!(frame.is_expired(Duration::from_millis(600)));
        // Out-of-order timestamps never count as elapsed time
        assert!(!frame.is_expired(Duration::from_millis(400)));
    }
}
