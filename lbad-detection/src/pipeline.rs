//! Pipeline orchestration
//!
//! The ingestion side runs on the caller's thread: every point is pulled
//! from the source, classified, aggregated into frames, and each closed frame
//! is characterized and handed to the detection worker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lbad_algorithms::{
    BackgroundFilter, BackgroundStats, Classification, FrameAggregator, FrameStats,
    MomentCharacterizer,
};
use lbad_core::{
    AnomalyDetector, Frame, ObjectCharacterizer, PipelineConfig, PointSource, Result, ResultSink,
    SourcePoll,
};
use tracing::{debug, error, info, warn};

use crate::chrono::Chronometer;
use crate::queue::{HandoffQueue, PushOutcome};
use crate::worker::{DetectionWorker, FrameSummary};

/// Longest wait on a silent source before shutdown is checked again
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Requests a graceful stop of a running pipeline from any thread
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Pipeline life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// Ingestion has stopped; the last frame and the queue are being drained
    Draining,
    Stopped,
}

/// Summary of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub points_read: u64,
    pub background: BackgroundStats,
    pub frames: FrameStats,
    pub frames_queued: u64,
    /// Frames displaced from the handoff queue before detection
    pub frames_dropped: u64,
    pub detections: u64,
    pub anomalies: u64,
    pub characterization_timer: Chronometer,
    pub detection_timer: Chronometer,
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "points read:        {}", self.points_read)?;
        writeln!(
            f,
            "background:         {} (learned {}, matched {}, low reflectivity {}, malformed {})",
            self.background.background(),
            self.background.learned,
            self.background.matched,
            self.background.low_reflectivity,
            self.background.malformed
        )?;
        writeln!(f, "candidates:         {}", self.background.candidates)?;
        writeln!(f, "frames closed:      {}", self.frames.frames_closed)?;
        writeln!(f, "frames dropped:     {}", self.frames_dropped)?;
        write!(
            f,
            "detections:         {} ({} anomalies)",
            self.detections, self.anomalies
        )
    }
}

/// Background filter, frame aggregator and characterizer driven from one
/// point source, feeding a detection worker.
pub struct Pipeline<D: AnomalyDetector + ?Sized + 'static> {
    config: PipelineConfig,
    detector: Arc<D>,
    shutdown: ShutdownHandle,
    state: PipelineState,
}

impl<D: AnomalyDetector + ?Sized + 'static> Pipeline<D> {
    pub fn new(config: PipelineConfig, detector: Arc<D>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            shutdown: ShutdownHandle::new(),
            state: PipelineState::Idle,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared detector; models may be replaced while the pipeline runs
    pub fn detector(&self) -> &Arc<D> {
        &self.detector
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Consume `source` until it ends or shutdown is requested.
    ///
    /// Every frame closed before the stop is characterized and compared
    /// before this returns. A source error stops ingestion the same way and
    /// is returned once the worker has drained.
    pub fn run<P, S>(&mut self, mut source: P, sink: S) -> Result<PipelineReport>
    where
        P: PointSource,
        S: ResultSink + 'static,
    {
        let mut filter = BackgroundFilter::new(&self.config)?;
        let mut aggregator = FrameAggregator::new(self.config.frame_time())?;
        let queue = Arc::new(HandoffQueue::new(self.config.queue_capacity)?);
        let worker = DetectionWorker::spawn(
            Arc::clone(&self.detector),
            Arc::clone(&queue),
            sink,
            self.config.timer_mode.times_detection(),
        )?;

        let mut stage = Characterize {
            characterizer: MomentCharacterizer::new(),
            timer: Chronometer::new(
                "characterization",
                self.config.timer_mode.times_characterization(),
            ),
            queue: &queue,
        };

        self.transition(PipelineState::Running);
        let mut points_read = 0u64;
        let mut failure = None;

        loop {
            if self.shutdown.is_requested() {
                info!("shutdown requested");
                break;
            }
            let point = match source.poll_point(SHUTDOWN_POLL) {
                Ok(SourcePoll::Point(point)) => point,
                Ok(SourcePoll::Idle) => continue,
                Ok(SourcePoll::Ended) => {
                    info!(points_read, "end of point stream");
                    break;
                }
                Err(e) => {
                    error!("point source failed: {}", e);
                    failure = Some(e);
                    break;
                }
            };
            points_read += 1;

            if let Some(frame) = aggregator.on_tick(point.timestamp) {
                stage.dispatch(frame);
            }
            if filter.classify(&point) == Classification::Candidate {
                if let Some(frame) = aggregator.on_point(point) {
                    stage.dispatch(frame);
                }
            }
        }

        self.transition(PipelineState::Draining);
        if let Some(frame) = aggregator.flush() {
            stage.dispatch(frame);
        }
        let characterization_timer = stage.timer;
        let worker_report = worker.join()?;
        self.transition(PipelineState::Stopped);

        let report = PipelineReport {
            points_read,
            background: filter.stats(),
            frames: aggregator.stats(),
            frames_queued: queue.pushed(),
            frames_dropped: queue.dropped(),
            detections: worker_report.processed,
            anomalies: worker_report.anomalies,
            characterization_timer,
            detection_timer: worker_report.detection_timer,
        };
        for timer in [&report.characterization_timer, &report.detection_timer] {
            if timer.is_enabled() {
                info!("{}", timer);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn transition(&mut self, state: PipelineState) {
        debug!(from = ?self.state, to = ?state, "pipeline state");
        if state == PipelineState::Running || state == PipelineState::Stopped {
            info!(state = ?state, "pipeline");
        }
        self.state = state;
    }
}

/// Characterizes closed frames on the ingestion thread and queues the result
struct Characterize<'a> {
    characterizer: MomentCharacterizer,
    timer: Chronometer,
    queue: &'a HandoffQueue<FrameSummary>,
}

impl Characterize<'_> {
    fn dispatch(&mut self, frame: Frame) {
        let Frame {
            sequence,
            start,
            points,
            ..
        } = frame;

        self.characterizer.new_object();
        for point in points {
            self.characterizer.new_point(point);
        }
        let characterizer = &mut self.characterizer;
        let characteristics = self.timer.time(|| characterizer.extract_characteristics());

        let summary = FrameSummary {
            sequence,
            frame_start: start,
            characteristics,
        };
        match self.queue.push(summary) {
            PushOutcome::Queued => {}
            PushOutcome::Displaced(oldest) => {
                warn!(
                    dropped = oldest.sequence,
                    total_dropped = self.queue.dropped(),
                    "handoff queue full, dropped oldest frame"
                );
            }
            PushOutcome::Rejected(summary) => {
                warn!(sequence = summary.sequence, "handoff queue closed, frame discarded");
            }
        }
    }
}
