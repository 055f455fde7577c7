// src/motion/lookahead.rs - Host-side queue of planned but uncommitted moves
use std::collections::VecDeque;

/// Queuing state of the toolhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuingState {
    /// Normal operation: new moves continue from the current print time.
    #[default]
    Main,
    /// The queue was reset; the next flush must re-prime the print time from
    /// the MCU clock instead of continuing the old timeline.
    NeedPrime,
}

/// A constant-velocity move for a single stepper that has not been assigned
/// a print time yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LookaheadMove {
    pub stepper: String,
    pub start_pos: f64,
    pub end_pos: f64,
    pub speed: f64,
}

impl LookaheadMove {
    pub fn distance(&self) -> f64 {
        (self.end_pos - self.start_pos).abs()
    }

    pub fn duration(&self) -> f64 {
        self.distance() / self.speed
    }
}

#[derive(Debug, Clone, Default)]
pub struct LookaheadQueue {
    queue: VecDeque<LookaheadMove>,
    state: QueuingState,
}

impl LookaheadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_move(&mut self, mv: LookaheadMove) {
        self.queue.push_back(mv);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn state(&self) -> QueuingState {
        self.state
    }

    pub fn set_state(&mut self, state: QueuingState) {
        self.state = state;
    }

    /// Take every queued move, in order, for flushing into the trapqs.
    pub fn drain(&mut self) -> Vec<LookaheadMove> {
        self.queue.drain(..).collect()
    }

    /// Discard all pending moves without flushing them, and require the next
    /// flush to re-prime. Returns how many moves were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.state = QueuingState::NeedPrime;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(stepper: &str, end: f64) -> LookaheadMove {
        LookaheadMove { stepper: stepper.to_string(), start_pos: 0.0, end_pos: end, speed: 5.0 }
    }

    #[test]
    fn test_move_duration() {
        assert_eq!(mv("pump_2", -10.0).duration(), 2.0);
    }

    #[test]
    fn test_reset_drops_moves_and_needs_prime() {
        let mut q = LookaheadQueue::new();
        q.add_move(mv("pump_2", 10.0));
        q.add_move(mv("pump_3", 10.0));
        assert_eq!(q.reset(), 2);
        assert!(q.is_empty());
        assert_eq!(q.state(), QueuingState::NeedPrime);
        assert_eq!(q.reset(), 0);
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut q = LookaheadQueue::new();
        q.add_move(mv("a", 1.0));
        q.add_move(mv("b", 2.0));
        let moves = q.drain();
        assert_eq!(moves[0].stepper, "a");
        assert_eq!(moves[1].stepper, "b");
        assert!(q.is_empty());
    }
}
