//! Frame aggregation
//!
//! Buckets candidate points into fixed-duration frames. A frame opens on the
//! first admitted point, so idle periods never produce empty frames.

use std::time::Duration;

use lbad_core::{Error, Frame, Result, ScanPoint};
use tracing::{debug, warn};

/// Aggregator life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// No frame open
    Idle,
    /// A frame is open and timing from its first point
    Accumulating,
}

/// Counters describing aggregator activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_closed: u64,
    pub points_admitted: u64,
    pub points_dispatched: u64,
    pub empty_frames_dropped: u64,
}

/// Accumulates candidate points into frames of `frame_time`
#[derive(Debug)]
pub struct FrameAggregator {
    frame_time: Duration,
    current: Option<Frame>,
    next_sequence: u64,
    stats: FrameStats,
}

impl FrameAggregator {
    pub fn new(frame_time: Duration) -> Result<Self> {
        if frame_time.is_zero() {
            return Err(Error::InvalidData(
                "frame_time must be positive".to_string(),
            ));
        }
        Ok(Self {
            frame_time,
            current: None,
            next_sequence: 0,
            stats: FrameStats::default(),
        })
    }

    pub fn state(&self) -> AggregatorState {
        if self.current.is_some() {
            AggregatorState::Accumulating
        } else {
            AggregatorState::Idle
        }
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    /// Admit a candidate point.
    ///
    /// If the open frame has expired by the point's timestamp it is closed
    /// and returned, and the point opens the next frame.
    pub fn on_point(&mut self, point: ScanPoint) -> Option<Frame> {
        let closed = self.on_tick(point.timestamp);
        self.stats.points_admitted += 1;

        match self.current.as_mut() {
            Some(frame) => frame.points.push(point),
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.current = Some(Frame::open(sequence, point, self.frame_time));
            }
        }

        closed
    }

    /// Advance the clock, closing the open frame once `frame_time` has elapsed
    pub fn on_tick(&mut self, now: Duration) -> Option<Frame> {
        let expired = self
            .current
            .as_ref()
            .is_some_and(|frame| frame.is_expired(now));
        if expired {
            self.close()
        } else {
            None
        }
    }

    /// Force-close the open frame regardless of its age
    pub fn flush(&mut self) -> Option<Frame> {
        self.close()
    }

    pub fn pending_points(&self) -> usize {
        self.current.as_ref().map_or(0, Frame::len)
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn close(&mut self) -> Option<Frame> {
        let frame = self.current.take()?;
        if frame.is_empty() {
            self.stats.empty_frames_dropped += 1;
            warn!(sequence = frame.sequence, "dropping empty frame");
            return None;
        }
        self.stats.frames_closed += 1;
        self.stats.points_dispatched += frame.len() as u64;
        debug!(
            sequence = frame.sequence,
            points = frame.len(),
            start_ms = frame.start.as_millis() as u64,
            "frame closed"
        );
        Some(frame)
    }
}
