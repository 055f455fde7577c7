//! Timing watermark shared by the step generator and the cancellation path.
//!
//! Four instants on the print-time axis:
//!
//! - `last_committed_time` / `last_flushed_time`: motion up to here already
//!   belongs to the MCU. Both only ever move forward.
//! - `next_generation_time` / `next_flush_time`: how far the generator and the
//!   flusher are allowed to run. These may be pulled back by a cancellation,
//!   but never below `last_committed_time`.

use serde::Serialize;

/// Default margin added on top of the sampled print time when cutting motion off.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingWatermark {
    last_committed_time: f64,
    last_flushed_time: f64,
    next_generation_time: f64,
    next_flush_time: f64,
    #[serde(skip)]
    safety_margin: f64,
}

impl TimingWatermark {
    pub fn new(safety_margin: f64) -> Self {
        let safety_margin = if safety_margin.is_finite() && safety_margin >= 0.0 {
            safety_margin
        } else {
            DEFAULT_SAFETY_MARGIN
        };
        Self {
            last_committed_time: 0.0,
            last_flushed_time: 0.0,
            next_generation_time: 0.0,
            next_flush_time: 0.0,
            safety_margin,
        }
    }

    pub fn last_committed_time(&self) -> f64 {
        self.last_committed_time
    }

    pub fn last_flushed_time(&self) -> f64 {
        self.last_flushed_time
    }

    pub fn next_generation_time(&self) -> f64 {
        self.next_generation_time
    }

    pub fn next_flush_time(&self) -> f64 {
        self.next_flush_time
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    /// Earliest instant that is safe to cut motion off at, given a fresh
    /// estimate of where the executor currently is.
    ///
    /// Anything before `last_committed_time` is already owned by the MCU, so a
    /// stale or lagging estimate is lifted to that bound first.
    pub fn compute_safe_cutover(&self, observed_executor_time: f64) -> f64 {
        // f64::max drops a NaN operand
        observed_executor_time.max(self.last_committed_time) + self.safety_margin
    }

    /// Pull the generation and flush gates to `cutover`.
    ///
    /// The committed/flushed pair is left alone. The value actually applied is
    /// returned; it is clamped so the gates can never drop below
    /// `last_committed_time`.
    pub fn apply(&mut self, cutover: f64) -> f64 {
        let applied = if cutover.is_nan() {
            self.last_committed_time
        } else {
            cutover.max(self.last_committed_time)
        };
        self.next_generation_time = applied;
        self.next_flush_time = applied;
        applied
    }

    /// Allow generation up to `time`. Used when new moves are flushed out of
    /// the lookahead queue; never narrows the gates.
    pub fn request_generation(&mut self, time: f64) {
        if time > self.next_generation_time {
            self.next_generation_time = time;
        }
        if time > self.next_flush_time {
            self.next_flush_time = time;
        }
    }

    /// Record that the executor now owns motion up to `time`.
    pub fn advance_committed(&mut self, time: f64) {
        if time > self.last_committed_time {
            self.last_committed_time = time;
        }
        // keep the gates at or above the committed bound
        if self.next_generation_time < self.last_committed_time {
            self.next_generation_time = self.last_committed_time;
        }
        if self.next_flush_time < self.last_committed_time {
            self.next_flush_time = self.last_committed_time;
        }
    }

    pub fn advance_flushed(&mut self, time: f64) {
        if time > self.last_flushed_time {
            self.last_flushed_time = time;
        }
    }
}

impl Default for TimingWatermark {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_MARGIN)
    }
}
