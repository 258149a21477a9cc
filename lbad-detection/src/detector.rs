//! Nearest-model anomaly detection
//!
//! Objects are compared against every known model with a weighted,
//! scale-normalized feature distance; the closest model wins and the object
//! is anomalous when its distance exceeds that model's threshold.

use std::path::Path;
use std::sync::Arc;

use lbad_core::{
    AnomalyDetector, AnomalyResult, CharacteristicsVector, DetectorConfig, Model, ModelSet, Result,
    FEATURE_COUNT,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Smallest magnitude used to normalize a feature difference
const SCALE_EPSILON: f32 = 1e-6;

/// Relative difference between two feature values, in `[0, 1]`
pub fn feature_distance(a: f32, b: f32) -> f32 {
    if a == b {
        return 0.0;
    }
    if !a.is_finite() || !b.is_finite() {
        return 1.0;
    }
    let scale = a.abs().max(b.abs()).max(SCALE_EPSILON);
    ((a - b).abs() / scale).min(1.0)
}

/// Weighted root-mean-square of the per-feature distances
pub fn distance(
    a: &CharacteristicsVector,
    b: &CharacteristicsVector,
    weights: &[f32; FEATURE_COUNT],
) -> f32 {
    let fa = a.features();
    let fb = b.features();

    let mut weighted = 0.0f32;
    let mut total_weight = 0.0f32;
    for i in 0..FEATURE_COUNT {
        let d = feature_distance(fa[i], fb[i]);
        weighted += weights[i] * d * d;
        total_weight += weights[i];
    }
    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted / total_weight).sqrt()
}

/// Detector holding a copy-on-write model set.
///
/// Readers take a snapshot and never block writers for longer than a pointer
/// swap; writers are serialized by a dedicated lock so concurrent
/// `set_model` calls never lose an update.
#[derive(Debug)]
pub struct NearestModelDetector {
    weights: [f32; FEATURE_COUNT],
    empty_object_is_anomaly: bool,
    models: RwLock<Arc<ModelSet>>,
    writer: Mutex<()>,
}

impl NearestModelDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: &DetectorConfig) -> Self {
        let mut weights = [0.0; FEATURE_COUNT];
        weights.copy_from_slice(&config.weights);
        Self {
            weights,
            empty_object_is_anomaly: config.empty_object_is_anomaly,
            models: RwLock::new(Arc::new(ModelSet::new())),
            writer: Mutex::new(()),
        }
    }

    /// Start from an existing model set
    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = RwLock::new(Arc::new(models));
        self
    }

    pub fn weights(&self) -> &[f32; FEATURE_COUNT] {
        &self.weights
    }

    fn publish(&self, models: ModelSet) {
        *self.models.write() = Arc::new(models);
    }
}

impl Default for NearestModelDetector {
    fn default() -> Self {
        Self::from_validated(&DetectorConfig::default())
    }
}

impl AnomalyDetector for NearestModelDetector {
    fn load_models(&self, path: &Path) -> Result<()> {
        let _writer = self.writer.lock();
        match lbad_io::load_models(path) {
            Ok(models) => {
                info!(path = %path.display(), count = models.len(), "loaded model library");
                self.publish(models);
                Ok(())
            }
            Err(e) => {
                warn!("{}; keeping {} previously loaded models", e, self.models().len());
                Err(e)
            }
        }
    }

    fn models(&self) -> Arc<ModelSet> {
        self.models.read().clone()
    }

    fn set_model(&self, model: Model) {
        let _writer = self.writer.lock();
        debug!(label = %model.label, threshold = model.threshold, "setting model");
        let updated = self.models().with_model(model);
        self.publish(updated);
    }

    fn compare(&self, characteristics: &CharacteristicsVector) -> AnomalyResult {
        if self.empty_object_is_anomaly && characteristics.is_empty() {
            return AnomalyResult::unmatched();
        }

        let models = self.models();
        let best = models
            .iter()
            .map(|model| (model, distance(characteristics, &model.reference, &self.weights)))
            .fold(None, |best: Option<(&Model, f32)>, (model, score)| match best {
                Some((_, best_score)) if best_score <= score => best,
                _ => Some((model, score)),
            });

        match best {
            Some((model, score)) => AnomalyResult {
                matched: Some(model.label.clone()),
                score,
                is_anomaly: score > model.threshold,
            },
            None => AnomalyResult::unmatched(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lbad_core::{Point3f, Vector3f};
    use std::thread;

    fn shape(count: usize, extents: (f32, f32, f32), reflectivity: f32) -> CharacteristicsVector {
        let extents = Vector3f::new(extents.0, extents.1, extents.2);
        CharacteristicsVector {
            point_count: count,
            min: Point3f::origin(),
            max: Point3f::from(extents),
            extents,
            centroid: Point3f::from(extents / 2.0),
            density: count as f32 / (extents.x * extents.y * extents.z),
            mean_reflectivity: reflectivity,
            shape: [0.5, 0.3, 0.2],
        }
    }

    #[test]
    fn test_feature_distance_rules() {
        assert_eq!(feature_distance(2.0, 2.0), 0.0);
        assert_eq!(feature_distance(f32::INFINITY, f32::INFINITY), 0.0);
        assert_eq!(feature_distance(f32::INFINITY, 3.0), 1.0);
        assert_eq!(feature_distance(f32::NAN, f32::NAN), 1.0);
        assert_relative_eq!(feature_distance(1.0, 2.0), 0.5);
        assert_relative_eq!(feature_distance(-1.0, 1.0), 1.0);
        assert_eq!(feature_distance(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_distance_ignores_position_by_default() {
        let a = shape(100, (1.0, 2.0, 0.5), 40.0);
        let mut b = a;
        b.centroid = Point3f::new(50.0, -20.0, 3.0);
        let detector = NearestModelDetector::default();
        assert_eq!(distance(&a, &b, detector.weights()), 0.0);
    }

    #[test]
    fn test_empty_model_set_is_anomalous() {
        let detector = NearestModelDetector::default();
        let result = detector.compare(&shape(10, (1.0, 1.0, 1.0), 10.0));
        assert_eq!(result.matched, None);
        assert_eq!(result.label(), "none");
        assert!(result.score.is_infinite());
        assert!(result.is_anomaly);
    }

    #[test]
    fn test_empty_object_policy() {
        let models = ModelSet::from_models(vec![Model::new("nothing", CharacteristicsVector::empty(), 0.1)]);
        let strict = NearestModelDetector::default().with_models(models.clone());
        assert_eq!(strict.compare(&CharacteristicsVector::empty()), AnomalyResult::unmatched());

        let config = DetectorConfig {
            empty_object_is_anomaly: false,
            ..DetectorConfig::default()
        };
        let lenient = NearestModelDetector::new(&config).unwrap().with_models(models);
        let result = lenient.compare(&CharacteristicsVector::empty());
        assert_eq!(result.label(), "nothing");
        assert_eq!(result.score, 0.0);
        assert!(!result.is_anomaly);
    }

    #[test]
    fn test_nearest_model_wins() {
        let detector = NearestModelDetector::default().with_models(ModelSet::from_models(vec![
            Model::new("crate", shape(400, (1.0, 1.0, 1.0), 30.0), 0.2),
            Model::new("pole", shape(150, (0.1, 0.1, 2.0), 60.0), 0.2),
        ]));

        let result = detector.compare(&shape(390, (1.05, 0.98, 1.0), 31.0));
        assert_eq!(result.label(), "crate");
        assert!(result.score < 0.2);
        assert!(!result.is_anomaly);

        let result = detector.compare(&shape(40, (3.0, 0.2, 0.2), 5.0));
        assert!(result.is_anomaly);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let reference = shape(100, (1.0, 1.0, 1.0), 20.0);
        let observed = shape(100, (1.0, 1.0, 1.0), 10.0);
        let score = distance(&observed, &reference, &NearestModelDetector::default().weights);

        let detector = NearestModelDetector::default()
            .with_models(ModelSet::from_models(vec![Model::new("cube", reference, score)]));
        assert!(!detector.compare(&observed).is_anomaly);
    }

    #[test]
    fn test_compare_is_idempotent() {
        let detector = NearestModelDetector::default().with_models(ModelSet::from_models(vec![
            Model::new("a", shape(100, (1.0, 1.0, 1.0), 20.0), 0.1),
            Model::new("b", shape(300, (2.0, 1.0, 1.0), 20.0), 0.1),
        ]));
        let observed = shape(200, (1.5, 1.0, 1.0), 20.0);
        let first = detector.compare(&observed);
        for _ in 0..10 {
            assert_eq!(detector.compare(&observed), first);
        }
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let detector = NearestModelDetector::default();
        detector.set_model(Model::new("a", shape(1, (1.0, 1.0, 1.0), 1.0), 0.1));
        let before = detector.models();
        detector.set_model(Model::new("b", shape(1, (1.0, 1.0, 1.0), 1.0), 0.1));

        assert_eq!(before.len(), 1);
        assert_eq!(detector.models().len(), 2);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let detector = Arc::new(NearestModelDetector::default());
        let observed = shape(100, (1.0, 1.0, 1.0), 20.0);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let detector = Arc::clone(&detector);
                thread::spawn(move || {
                    for i in 0..25 {
                        let label = format!("model-{}-{}", w, i);
                        detector.set_model(Model::new(label, shape(100 + i, (1.0, 1.0, 1.0), 20.0), 0.1));
                    }
                })
            })
            .collect();

        let reader = {
            let detector = Arc::clone(&detector);
            thread::spawn(move || {
                for _ in 0..200 {
                    let result = detector.compare(&observed);
                    assert!(result.score.is_finite() || result.matched.is_none());
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(detector.models().len(), 100);
        assert!(!detector.compare(&observed).is_anomaly);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let config = DetectorConfig {
            weights: vec![1.0; 3],
            ..DetectorConfig::default()
        };
        assert!(NearestModelDetector::new(&config).is_err());
    }
}
