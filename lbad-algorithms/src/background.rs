//! Background filtering
//!
//! Separates static scenery from the object being scanned. During a learning
//! window every return is recorded in a voxel grid of [`BackgroundCell`]s;
//! afterwards a return is background if it falls into (or next to) a known
//! cell, or if its reflectivity is below the configured floor.

use std::collections::HashMap;
use std::time::Duration;

use lbad_core::{
    BackgroundConfig, Error, LearningWindowStart, PipelineConfig, Result, ScanPoint,
};
use tracing::{debug, trace};

/// Integer voxel coordinates of a background cell
pub type VoxelKey = (i32, i32, i32);

/// Verdict for a single point, decided once at arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Background,
    Candidate,
}

/// Hit statistics for one voxel of static scenery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundCell {
    pub hits: u64,
    pub last_seen: Duration,
}

/// Counters describing how points were classified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackgroundStats {
    /// Points recorded during the learning window
    pub learned: u64,
    /// Points matched against a known cell after learning
    pub matched: u64,
    /// Points rejected by the reflectivity floor
    pub low_reflectivity: u64,
    /// Points with non-finite coordinates or reflectivity
    pub malformed: u64,
    pub candidates: u64,
    /// Cells currently tracked
    pub cells: usize,
}

impl BackgroundStats {
    /// Every point classified as background, for whatever reason
    pub fn background(&self) -> u64 {
        self.learned + self.matched + self.low_reflectivity + self.malformed
    }
}

/// Voxel-grid background model with a time-bounded learning window
#[derive(Debug)]
pub struct BackgroundFilter {
    voxel_size: f32,
    background_time: Duration,
    min_reflectivity: f32,
    cell_ttl: Option<Duration>,
    window_start: Option<Duration>,
    learning_reported: bool,
    last_prune: Duration,
    cells: HashMap<VoxelKey, BackgroundCell>,
    stats: BackgroundStats,
}

impl BackgroundFilter {
    /// Create a filter from the pipeline configuration
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_settings(
            &config.background,
            config.background_time(),
            config.min_reflectivity,
        )
    }

    /// Create a filter from explicit settings
    pub fn with_settings(
        settings: &BackgroundConfig,
        background_time: Duration,
        min_reflectivity: f32,
    ) -> Result<Self> {
        if !(settings.voxel_size.is_finite() && settings.voxel_size > 0.0) {
            return Err(Error::InvalidData(
                "voxel_size must be positive".to_string(),
            ));
        }

        let window_start = match settings.learning_start {
            LearningWindowStart::FirstPoint => None,
            LearningWindowStart::ClockOrigin => Some(Duration::ZERO),
        };

        Ok(Self {
            voxel_size: settings.voxel_size,
            background_time,
            min_reflectivity,
            cell_ttl: settings.cell_ttl_ms.map(Duration::from_millis),
            window_start,
            learning_reported: false,
            last_prune: Duration::ZERO,
            cells: HashMap::new(),
            stats: BackgroundStats::default(),
        })
    }

    /// Classify a point, updating the background model as a side effect
    pub fn classify(&mut self, point: &ScanPoint) -> Classification {
        let now = point.timestamp;
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }

        if let Err(e) = point.check_finite() {
            self.stats.malformed += 1;
            trace!("dropping point: {}", e);
            return Classification::Background;
        }

        let key = self.voxel_key(point);

        if self.is_learning(now) {
            self.stats.learned += 1;
            self.record(key, now);
            return Classification::Background;
        }

        if !self.learning_reported {
            self.learning_reported = true;
            debug!(
                cells = self.cells.len(),
                learned = self.stats.learned,
                "background learning window closed"
            );
        }

        self.maybe_prune(now);

        if let Some(matched) = self.find_neighbor(key) {
            self.stats.matched += 1;
            self.record(matched, now);
            return Classification::Background;
        }

        if point.reflectivity < self.min_reflectivity {
            self.stats.low_reflectivity += 1;
            return Classification::Background;
        }

        self.stats.candidates += 1;
        Classification::Candidate
    }

    /// True while `now` lies inside the learning window
    pub fn is_learning(&self, now: Duration) -> bool {
        match self.window_start {
            Some(start) => now.saturating_sub(start) < self.background_time,
            // Nothing seen yet: the window has not even started
            None => true,
        }
    }

    /// End of the learning window, once its start is known
    pub fn learning_ends_at(&self) -> Option<Duration> {
        self.window_start.map(|start| start + self.background_time)
    }

    /// Forget cells not refreshed within the configured TTL, returning how many were removed
    pub fn prune(&mut self, now: Duration) -> usize {
        let Some(ttl) = self.cell_ttl else {
            return 0;
        };
        let before = self.cells.len();
        self.cells
            .retain(|_, cell| now.saturating_sub(cell.last_seen) <= ttl);
        self.last_prune = now;
        before - self.cells.len()
    }

    pub fn cell(&self, key: VoxelKey) -> Option<&BackgroundCell> {
        self.cells.get(&key)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn stats(&self) -> BackgroundStats {
        BackgroundStats {
            cells: self.cells.len(),
            ..self.stats
        }
    }

    /// Voxel containing `point`
    pub fn voxel_key(&self, point: &ScanPoint) -> VoxelKey {
        let p = point.position;
        (
            (p.x / self.voxel_size).floor() as i32,
            (p.y / self.voxel_size).floor() as i32,
            (p.z / self.voxel_size).floor() as i32,
        )
    }

    fn record(&mut self, key: VoxelKey, now: Duration) {
        let cell = self.cells.entry(key).or_insert(BackgroundCell {
            hits: 0,
            last_seen: now,
        });
        cell.hits += 1;
        cell.last_seen = cell.last_seen.max(now);
    }

    /// The point's own cell if known, otherwise any known cell of the 26-neighbourhood
    fn find_neighbor(&self, (x, y, z): VoxelKey) -> Option<VoxelKey> {
        if self.cells.contains_key(&(x, y, z)) {
            return Some((x, y, z));
        }
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (
                        x.saturating_add(dx),
                        y.saturating_add(dy),
                        z.saturating_add(dz),
                    );
                    if self.cells.contains_key(&key) {
                        return Some(key);
                    }
                }
            }
        }
        None
    }

    fn maybe_prune(&mut self, now: Duration) {
        if let Some(ttl) = self.cell_ttl {
            if now.saturating_sub(self.last_prune) >= ttl {
                let removed = self.prune(now);
                if removed > 0 {
                    debug!(removed, remaining = self.cells.len(), "pruned stale background cells");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(learning_start: LearningWindowStart) -> BackgroundFilter {
        let settings = BackgroundConfig {
            voxel_size: 0.1,
            learning_start,
            cell_ttl_ms: None,
        };
        BackgroundFilter::with_settings(&settings, Duration::from_millis(500), 10.0).unwrap()
    }

    #[test]
    fn test_learning_window_is_background() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        for t in 0..500 {
            let p = ScanPoint::from_xyz(t as f32, 0.0, 0.0, 50.0, 1000 + t);
            assert_eq!(filter.classify(&p), Classification::Background);
        }
        assert_eq!(filter.stats().learned, 500);
        assert_eq!(filter.learning_ends_at(), Some(Duration::from_millis(1500)));
        assert!(filter.cell_count() > 0);
    }

    #[test]
    fn test_static_scene_matches_after_learning() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0));

        // Same voxel and a neighbouring voxel both match
        let same = ScanPoint::from_xyz(0.01, 0.02, 0.03, 50.0, 600);
        let near = ScanPoint::from_xyz(0.15, 0.0, 0.0, 50.0, 601);
        assert_eq!(filter.classify(&same), Classification::Background);
        assert_eq!(filter.classify(&near), Classification::Background);

        // Two voxels away is a candidate
        let far = ScanPoint::from_xyz(0.25, 0.0, 0.0, 50.0, 602);
        assert_eq!(filter.classify(&far), Classification::Candidate);

        let stats = filter.stats();
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.candidates, 1);
    }

    #[test]
    fn test_matched_points_refresh_cells() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        let origin = ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0);
        filter.classify(&origin);
        let key = filter.voxel_key(&origin);
        assert_eq!(filter.cell(key).unwrap().hits, 1);

        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 900));
        let cell = filter.cell(key).unwrap();
        assert_eq!(cell.hits, 2);
        assert_eq!(cell.last_seen, Duration::from_millis(900));
    }

    #[test]
    fn test_low_reflectivity_is_background() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0));

        let dim = ScanPoint::from_xyz(5.0, 5.0, 5.0, 9.9, 700);
        let bright = ScanPoint::from_xyz(5.0, 5.0, 5.0, 10.0, 701);
        assert_eq!(filter.classify(&dim), Classification::Background);
        assert_eq!(filter.classify(&bright), Classification::Candidate);
        assert_eq!(filter.stats().low_reflectivity, 1);
        // Noise never becomes scenery
        assert_eq!(filter.cell_count(), 1);
    }

    #[test]
    fn test_non_finite_points_are_counted() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0));

        let nan = ScanPoint::from_xyz(f32::NAN, 1.0, 1.0, 50.0, 800);
        let inf = ScanPoint::from_xyz(1.0, f32::NEG_INFINITY, 1.0, 50.0, 801);
        assert_eq!(filter.classify(&nan), Classification::Background);
        assert_eq!(filter.classify(&inf), Classification::Background);

        let stats = filter.stats();
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.background(), 3);
        assert_eq!(stats.candidates, 0);
    }

    #[test]
    fn test_nan_reflectivity_never_reaches_frames() {
        let mut filter = filter(LearningWindowStart::FirstPoint);
        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0));

        let nan = ScanPoint::from_xyz(3.0, 3.0, 3.0, f32::NAN, 700);
        let inf = ScanPoint::from_xyz(3.0, 3.0, 3.0, f32::INFINITY, 701);
        let good = ScanPoint::from_xyz(3.0, 3.0, 3.0, 50.0, 702);
        assert_eq!(filter.classify(&nan), Classification::Background);
        assert_eq!(filter.classify(&inf), Classification::Background);
        assert_eq!(filter.classify(&good), Classification::Candidate);

        let stats = filter.stats();
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.low_reflectivity, 0);
        assert_eq!(stats.candidates, 1);
    }

    #[test]
    fn test_learning_window_policies() {
        // Stream starts two seconds into the sensor clock
        let first = ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 2000);
        let object = ScanPoint::from_xyz(3.0, 3.0, 3.0, 50.0, 2100);

        let mut from_first = filter(LearningWindowStart::FirstPoint);
        from_first.classify(&first);
        assert_eq!(from_first.classify(&object), Classification::Background);

        let mut from_origin = filter(LearningWindowStart::ClockOrigin);
        assert_eq!(from_origin.learning_ends_at(), Some(Duration::from_millis(500)));
        from_origin.classify(&first);
        assert_eq!(from_origin.classify(&object), Classification::Candidate);
    }

    #[test]
    fn test_stale_cells_are_pruned() {
        let settings = BackgroundConfig {
            voxel_size: 0.1,
            learning_start: LearningWindowStart::FirstPoint,
            cell_ttl_ms: Some(1000),
        };
        let mut filter =
            BackgroundFilter::with_settings(&settings, Duration::from_millis(100), 0.0).unwrap();
        filter.classify(&ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 0));
        filter.classify(&ScanPoint::from_xyz(1.0, 0.0, 0.0, 50.0, 50));
        assert_eq!(filter.cell_count(), 2);

        // Keep the second cell alive
        filter.classify(&ScanPoint::from_xyz(1.0, 0.0, 0.0, 50.0, 900));
        assert_eq!(filter.prune(Duration::from_millis(1500)), 1);
        assert_eq!(filter.cell_count(), 1);

        // The forgotten spot now reads as an object
        let back = ScanPoint::from_xyz(0.0, 0.0, 0.0, 50.0, 1600);
        assert_eq!(filter.classify(&back), Classification::Candidate);
    }

    #[test]
    fn test_invalid_voxel_size() {
        let settings = BackgroundConfig {
            voxel_size: 0.0,
            ..BackgroundConfig::default()
        };
        assert!(BackgroundFilter::with_settings(&settings, Duration::ZERO, 0.0).is_err());
    }
}
