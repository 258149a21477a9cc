//! Core traits for lbad
//!
//! The pipeline is wired from narrow capabilities so that point origins and
//! detector implementations can be swapped at startup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    characteristics::CharacteristicsVector,
    error::Result,
    model::{AnomalyResult, Detection, Model, ModelSet},
    point::ScanPoint,
};

/// Outcome of waiting a bounded time for a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourcePoll {
    Point(ScanPoint),
    /// Nothing arrived in time; the stream is still open
    Idle,
    Ended,
}

/// A lazy, possibly unbounded, stream of sensor returns
pub trait PointSource {
    /// Produce the next point, or `Ok(None)` at end of stream
    fn next_point(&mut self) -> Result<Option<ScanPoint>>;

    /// Wait at most `timeout` for the next point.
    ///
    /// Live sources override this so the caller regains control while the
    /// sensor is silent. The default defers to [`next_point`](Self::next_point).
    fn poll_point(&mut self, _timeout: Duration) -> Result<SourcePoll> {
        Ok(match self.next_point()? {
            Some(point) => SourcePoll::Point(point),
            None => SourcePoll::Ended,
        })
    }
}

impl<S: PointSource + ?Sized> PointSource for Box<S> {
    fn next_point(&mut self) -> Result<Option<ScanPoint>> {
        (**self).next_point()
    }

    fn poll_point(&mut self, timeout: Duration) -> Result<SourcePoll> {
        (**self).poll_point(timeout)
    }
}

/// Turns the points of one object into a [`CharacteristicsVector`]
pub trait ObjectCharacterizer {
    /// Append a point to the object being built
    fn new_point(&mut self, point: ScanPoint);

    /// Discard the object being built and start a new one
    fn new_object(&mut self);

    /// Summarize the buffered object and start a new one.
    ///
    /// An empty buffer yields [`CharacteristicsVector::empty`].
    fn extract_characteristics(&mut self) -> CharacteristicsVector;
}

/// Classifies objects against a library of known models.
///
/// Implementations are shared between the detection worker and external
/// callers, so every method takes `&self`.
pub trait AnomalyDetector: Send + Sync {
    /// Replace the model set with the library stored at `path`.
    ///
    /// On error the previously loaded set stays active.
    fn load_models(&self, path: &Path) -> Result<()>;

    /// Snapshot of the models currently in use
    fn models(&self) -> Arc<ModelSet>;

    /// Add a model, or replace the one with the same label
    fn set_model(&self, model: Model);

    /// Compare an object against the current models
    fn compare(&self, characteristics: &CharacteristicsVector) -> AnomalyResult;
}

impl<D: AnomalyDetector + ?Sized> AnomalyDetector for Arc<D> {
    fn load_models(&self, path: &Path) -> Result<()> {
        (**self).load_models(path)
    }

    fn models(&self) -> Arc<ModelSet> {
        (**self).models()
    }

    fn set_model(&self, model: Model) {
        (**self).set_model(model)
    }

    fn compare(&self, characteristics: &CharacteristicsVector) -> AnomalyResult {
        (**self).compare(characteristics)
    }
}

/// Receives classification results from the detection worker
pub trait ResultSink: Send {
    fn on_detection(&mut self, detection: Detection);
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn on_detection(&mut self, detection: Detection) {
        (**self).on_detection(detection)
    }
}
