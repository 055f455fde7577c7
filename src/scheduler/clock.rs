// src/scheduler/clock.rs - Host monotonic time and MCU print-time estimation
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClockError {
    #[error("MCU clock is not synchronized")]
    NotSynchronized,
}

/// Source of the executor's time estimate.
pub trait McuClock {
    /// Host monotonic time in seconds; used as the reactor event time.
    fn monotonic(&self) -> f64;

    /// Best estimate of the print time the MCU is executing at `eventtime`.
    fn estimated_print_time(&self, eventtime: f64) -> Result<f64, ClockError>;
}

/// Clock backed by the host's monotonic clock, with a fixed print-time offset.
#[derive(Debug, Clone)]
pub struct HostClock {
    epoch: Instant,
    print_time_offset: f64,
}

impl HostClock {
    pub fn new() -> Self {
        Self::with_offset(0.0)
    }

    pub fn with_offset(print_time_offset: f64) -> Self {
        Self {
            epoch: Instant::now(),
            print_time_offset,
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl McuClock for HostClock {
    fn monotonic(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn estimated_print_time(&self, eventtime: f64) -> Result<f64, ClockError> {
        Ok(eventtime + self.print_time_offset)
    }
}

/// Hand-driven clock for simulation and tests. Clones share state, so a test
/// can keep one handle and give the other to the printer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
    print_time: Rc<Cell<f64>>,
    unavailable: Rc<Cell<bool>>,
}

impl ManualClock {
    pub fn new(print_time: f64) -> Self {
        let clock = Self::default();
        clock.set_print_time(print_time);
        clock
    }

    pub fn set_print_time(&self, print_time: f64) {
        self.print_time.set(print_time);
    }

    pub fn advance(&self, dt: f64) {
        self.now.set(self.now.get() + dt);
        self.print_time.set(self.print_time.get() + dt);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.set(!available);
    }
}

impl McuClock for ManualClock {
    fn monotonic(&self) -> f64 {
        self.now.get()
    }

    fn estimated_print_time(&self, _eventtime: f64) -> Result<f64, ClockError> {
        if self.unavailable.get() {
            return Err(ClockError::NotSynchronized);
        }
        Ok(self.print_time.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shares_state() {
        let clock = ManualClock::new(10.0);
        let handle = clock.clone();
        handle.advance(0.5);
        assert_eq!(clock.estimated_print_time(0.0), Ok(10.5));
        assert_eq!(clock.monotonic(), 0.5);
        handle.set_available(false);
        assert_eq!(clock.estimated_print_time(0.0), Err(ClockError::NotSynchronized));
    }

    #[test]
    fn test_host_clock_offset() {
        let clock = HostClock::with_offset(3.0);
        let now = clock.monotonic();
        assert_eq!(clock.estimated_print_time(now), Ok(now + 3.0));
    }
}
