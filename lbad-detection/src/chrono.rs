//! Stage timing

use std::fmt;
use std::time::{Duration, Instant};

/// Accumulates wall-clock timings for one pipeline stage.
///
/// A disabled chronometer runs the timed closure without measuring it.
#[derive(Debug, Clone)]
pub struct Chronometer {
    name: &'static str,
    enabled: bool,
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Chronometer {
    pub fn new(name: &'static str, enabled: bool) -> Self {
        Self {
            name,
            enabled,
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    /// Run `f`, recording how long it took when enabled
    pub fn time<R>(&mut self, f: impl FnOnce() -> R) -> R {
        if !self.enabled {
            return f();
        }
        let started = Instant::now();
        let result = f();
        self.record(started.elapsed());
        result
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn min(&self) -> Option<Duration> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<Duration> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<Duration> {
        u32::try_from(self.count)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| self.total / n)
    }
}

impl fmt::Display for Chronometer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min(), self.mean(), self.max()) {
            (Some(min), Some(mean), Some(max)) => write!(
                f,
                "{}: {} runs, total {:?}, min {:?}, mean {:?}, max {:?}",
                self.name, self.count, self.total, min, mean, max
            ),
            _ => write!(f, "{}: no runs", self.name),
        }
    }
}
