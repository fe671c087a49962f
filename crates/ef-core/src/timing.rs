//! Lightweight wall-clock timing.
//!
//! Stages use [`Timer`] to report where a run spends its time (engine build,
//! engine run, artifact save). Elapsed times are plain seconds so they can be
//! summed into reports and written to manifests.

use std::time::Instant;

/// A simple timer that measures elapsed time.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Seconds since the timer started.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer and return elapsed time in seconds.
    pub fn stop(self) -> f64 {
        self.elapsed_s()
    }

    /// Stop the timer, emit a debug event and return the elapsed seconds.
    pub fn stop_and_log(self) -> f64 {
        let label = self.label;
        let elapsed_s = self.stop();
        tracing::debug!(stage = label, elapsed_s, "timer stopped");
        elapsed_s
    }
}

/// Accumulates elapsed time over repeated measurements of the same stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulated {
    pub total_s: f64,
    pub count: u64,
}

impl Accumulated {
    pub fn record(&mut self, elapsed_s: f64) {
        self.total_s += elapsed_s;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Accumulated) {
        self.total_s += other.total_s;
        self.count += other.count;
    }

    /// Average time per measurement (in seconds).
    pub fn average_s(&self) -> f64 {
        if self.count > 0 {
            self.total_s / self.count as f64
        } else {
            0.0
        }
    }
}
