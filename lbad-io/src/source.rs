//! Point source implementations
//!
//! [`FilePointSource`] replays a recording; [`ChannelPointSource`] is fed by
//! a sensor driver running on its own thread.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendError, Sender, TrySendError};
use lbad_core::{Error, PointSource, Result, ScanPoint, SourcePoll};
use tracing::{debug, warn};

use crate::points::PointFileReader;

/// Number of characters in a sensor broadcast code
pub const BROADCAST_CODE_LEN: usize = 15;

/// How fast a recording is replayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// As fast as the pipeline consumes points
    #[default]
    Unpaced,
    /// Emit points at the offsets given by their timestamps, like a live sensor
    Realtime,
}

/// Replays a point recording from disk.
///
/// Unparseable lines are logged, counted and skipped; I/O errors end the
/// stream with an error.
pub struct FilePointSource {
    reader: PointFileReader<BufReader<File>>,
    pacing: Pacing,
    clock: Option<(Instant, Duration)>,
    points_read: u64,
    lines_skipped: u64,
}

impl FilePointSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = PointFileReader::open(path)?;
        debug!(path = %path.display(), schema = ?reader.schema(), "opened point recording");
        Ok(Self {
            reader,
            pacing: Pacing::Unpaced,
            clock: None,
            points_read: 0,
            lines_skipped: 0,
        })
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn points_read(&self) -> u64 {
        self.points_read
    }

    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped
    }

    fn pace(&mut self, timestamp: Duration) {
        if self.pacing != Pacing::Realtime {
            return;
        }
        let (started, origin) = *self.clock.get_or_insert((Instant::now(), timestamp));
        let due = started + timestamp.saturating_sub(origin);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl PointSource for FilePointSource {
    fn next_point(&mut self) -> Result<Option<ScanPoint>> {
        loop {
            match self.reader.next() {
                Some(Ok(point)) => {
                    self.points_read += 1;
                    self.pace(point.timestamp);
                    return Ok(Some(point));
                }
                Some(Err(Error::InvalidData(msg))) => {
                    self.lines_skipped += 1;
                    warn!("skipping unreadable point: {}", msg);
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }
}

/// Check that a broadcast code has the expected shape
pub fn validate_broadcast_code(code: &str) -> Result<()> {
    if code.len() != BROADCAST_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidData(format!(
            "broadcast code must be {} alphanumeric characters, got {:?}",
            BROADCAST_CODE_LEN, code
        )));
    }
    Ok(())
}

/// Sending half handed to a sensor driver callback
#[derive(Debug, Clone)]
pub struct PointFeeder {
    sender: Sender<ScanPoint>,
}

impl PointFeeder {
    /// Deliver a point, waiting if the channel is bounded and full.
    ///
    /// Fails only when the pipeline side has gone away.
    pub fn feed(&self, point: ScanPoint) -> Result<()> {
        self.sender
            .send(point)
            .map_err(|SendError(_)| Error::Worker("point source closed".to_string()))
    }

    /// Deliver a point without waiting; returns `false` if it was not accepted
    pub fn try_feed(&self, point: ScanPoint) -> bool {
        match self.sender.try_send(point) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Point source fed from another thread, typically a sensor SDK callback.
///
/// The stream ends once every [`PointFeeder`] has been dropped.
#[derive(Debug)]
pub struct ChannelPointSource {
    receiver: Receiver<ScanPoint>,
}

impl ChannelPointSource {
    /// Unbounded source; feeders never wait
    pub fn unbounded() -> (PointFeeder, Self) {
        let (sender, receiver) = channel::unbounded();
        (PointFeeder { sender }, Self { receiver })
    }

    /// Bounded source holding at most `capacity` undelivered points
    pub fn bounded(capacity: usize) -> (PointFeeder, Self) {
        let (sender, receiver) = channel::bounded(capacity);
        (PointFeeder { sender }, Self { receiver })
    }

    /// Points waiting to be consumed
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }
}

impl PointSource for ChannelPointSource {
    fn next_point(&mut self) -> Result<Option<ScanPoint>> {
        Ok(self.receiver.recv().ok())
    }

    fn poll_point(&mut self, timeout: Duration) -> Result<SourcePoll> {
        match self.receiver.recv_timeout(timeout) {
            Ok(point) => Ok(SourcePoll::Point(point)),
            Err(RecvTimeoutError::Timeout) => Ok(SourcePoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourcePoll::Ended),
        }
    }
}
