//! Configuration types for the detection pipeline.
//!
//! Every struct has serde support and sensible defaults so a configuration
//! file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::characteristics::FEATURE_COUNT;
use crate::error::{Error, Result};

/// Default frame duration (ms)
pub const DEFAULT_FRAME_TIME_MS: u64 = 100;
/// Default background learning time (ms)
pub const DEFAULT_BACKGROUND_TIME_MS: u64 = 500;
/// Default minimum reflectivity
pub const DEFAULT_MIN_REFLECTIVITY: f32 = 0.0;
/// Default handoff queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Timing instrumentation
// ---------------------------------------------------------------------------

/// Which stages are wrapped by chronometers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    #[default]
    Untimed,
    Characterization,
    AnomalyDetection,
    All,
}

impl TimerMode {
    pub fn times_characterization(self) -> bool {
        matches!(self, TimerMode::Characterization | TimerMode::All)
    }

    pub fn times_detection(self) -> bool {
        matches!(self, TimerMode::AnomalyDetection | TimerMode::All)
    }
}

// ---------------------------------------------------------------------------
// Background filter
// ---------------------------------------------------------------------------

/// Where the background learning window starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningWindowStart {
    /// At the timestamp of the first point the filter sees
    #[default]
    FirstPoint,
    /// At time zero of the point clock (acquisition start)
    ClockOrigin,
}

/// Tuning parameters for the background filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Edge length of a background cell (metres); also the match tolerance
    pub voxel_size: f32,
    pub learning_start: LearningWindowStart,
    /// Forget cells not refreshed for this long (ms); `None` keeps them forever
    pub cell_ttl_ms: Option<u64>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.05,
            learning_start: LearningWindowStart::FirstPoint,
            cell_ttl_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Tuning parameters for model comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Per-feature weights, ordered as `CharacteristicsVector::features`
    pub weights: Vec<f32>,
    /// Report objects without points as anomalies instead of comparing them
    pub empty_object_is_anomaly: bool,
}

impl DetectorConfig {
    /// Default weights: every feature counts except the centroid, so
    /// comparison does not depend on where the object sits in the scene
    pub fn default_weights() -> Vec<f32> {
        let mut weights = vec![1.0; FEATURE_COUNT];
        weights[3..6].fill(0.0);
        weights
    }

    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != FEATURE_COUNT {
            return Err(Error::Config(format!(
                "expected {} feature weights, got {}",
                FEATURE_COUNT,
                self.weights.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(
                "feature weights must be finite and non-negative".to_string(),
            ));
        }
        if self.weights.iter().sum::<f32>() <= 0.0 {
            return Err(Error::Config(
                "at least one feature weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            weights: Self::default_weights(),
            empty_object_is_anomaly: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level pipeline configuration
// ---------------------------------------------------------------------------

/// Aggregated configuration for the full pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_time_ms: u64,
    pub background_time_ms: u64,
    pub min_reflectivity: f32,
    pub timer_mode: TimerMode,
    pub queue_capacity: usize,
    pub background: BackgroundConfig,
    pub detector: DetectorConfig,
}

impl PipelineConfig {
    pub fn frame_time(&self) -> Duration {
        Duration::from_millis(self.frame_time_ms)
    }

    pub fn background_time(&self) -> Duration {
        Duration::from_millis(self.background_time_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_time_ms == 0 {
            return Err(Error::Config("frame_time_ms must be positive".to_string()));
        }
        if !self.min_reflectivity.is_finite() {
            return Err(Error::Config("min_reflectivity must be finite".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if !(self.background.voxel_size.is_finite() && self.background.voxel_size > 0.0) {
            return Err(Error::Config("background.voxel_size must be positive".to_string()));
        }
        self.detector.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_time_ms: DEFAULT_FRAME_TIME_MS,
            background_time_ms: DEFAULT_BACKGROUND_TIME_MS,
            min_reflectivity: DEFAULT_MIN_REFLECTIVITY,
            timer_mode: TimerMode::Untimed,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            background: BackgroundConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
