//! Detection worker thread and result sinks

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lbad_core::{AnomalyDetector, CharacteristicsVector, Detection, Error, ResultSink, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::chrono::Chronometer;
use crate::queue::HandoffQueue;

/// Name of the detection thread
pub const WORKER_THREAD_NAME: &str = "anomaly-detector";

/// Characteristics of one closed frame, as handed to the worker
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub sequence: u64,
    pub frame_start: Duration,
    pub characteristics: CharacteristicsVector,
}

/// What the worker did before it stopped
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub processed: u64,
    pub anomalies: u64,
    pub detection_timer: Chronometer,
}

/// Owns the detection thread.
///
/// The thread drains the handoff queue in FIFO order, compares each frame
/// against the detector's current models and forwards the result to the
/// sink. It exits once the queue is closed and empty.
#[derive(Debug)]
pub struct DetectionWorker {
    queue: Arc<HandoffQueue<FrameSummary>>,
    handle: Option<JoinHandle<WorkerReport>>,
}

impl DetectionWorker {
    pub fn spawn<D, S>(
        detector: D,
        queue: Arc<HandoffQueue<FrameSummary>>,
        sink: S,
        timed: bool,
    ) -> Result<Self>
    where
        D: AnomalyDetector + 'static,
        S: ResultSink + 'static,
    {
        let consumer = Arc::clone(&queue);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || drain(detector, &consumer, sink, timed))?;
        debug!("detection worker started");

        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    /// Ask the worker to finish once the queue is drained
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn queue(&self) -> &Arc<HandoffQueue<FrameSummary>> {
        &self.queue
    }

    /// Close the queue and wait for the worker to drain it
    pub fn join(mut self) -> Result<WorkerReport> {
        self.close();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::Worker("detection worker already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| Error::Worker("detection thread panicked".to_string()))
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.close();
            if handle.join().is_err() {
                warn!("detection thread panicked");
            }
        }
    }
}

fn drain<D, S>(detector: D, queue: &HandoffQueue<FrameSummary>, mut sink: S, timed: bool) -> WorkerReport
where
    D: AnomalyDetector,
    S: ResultSink,
{
    let mut report = WorkerReport {
        processed: 0,
        anomalies: 0,
        detection_timer: Chronometer::new("anomaly detection", timed),
    };

    while let Some(summary) = queue.pop_blocking() {
        let result = report
            .detection_timer
            .time(|| detector.compare(&summary.characteristics));
        report.processed += 1;
        if result.is_anomaly {
            report.anomalies += 1;
        }
        sink.on_detection(Detection {
            sequence: summary.sequence,
            frame_start: summary.frame_start,
            result,
        });
    }

    debug!(processed = report.processed, "detection worker drained");
    report
}

/// Logs every detection through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn on_detection(&mut self, detection: Detection) {
        let result = &detection.result;
        if result.is_anomaly {
            warn!(
                sequence = detection.sequence,
                frame_start_ms = detection.frame_start.as_millis() as u64,
                model = result.label(),
                score = result.score,
                "anomaly"
            );
        } else {
            info!(
                sequence = detection.sequence,
                frame_start_ms = detection.frame_start.as_millis() as u64,
                model = result.label(),
                score = result.score,
                "matched"
            );
        }
    }
}

/// Collects detections into a shared list
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    detections: Arc<Mutex<Vec<Detection>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far
    pub fn detections(&self) -> Vec<Detection> {
        self.detections.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.detections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.lock().is_empty()
    }
}

impl ResultSink for CollectingSink {
    fn on_detection(&mut self, detection: Detection) {
        self.detections.lock().push(detection);
    }
}
