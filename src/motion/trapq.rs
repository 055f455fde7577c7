// src/motion/trapq.rs - Per-stepper trajectory queues and the step generation gate
use std::collections::VecDeque;

use crate::motion::watermark::TimingWatermark;

/// Constant-velocity motion segment, stamped with the print time it starts at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapSegment {
    /// Print time at the start of the segment (seconds)
    pub print_time: f64,
    /// Duration of the segment (seconds)
    pub duration: f64,
    /// Position at the start of the segment (mm)
    pub start_pos: f64,
    /// Signed velocity over the segment (mm/s)
    pub velocity: f64,
}

impl TrapSegment {
    pub fn end_time(&self) -> f64 {
        self.print_time + self.duration
    }

    pub fn end_pos(&self) -> f64 {
        self.position_at(self.end_time())
    }

    pub fn position_at(&self, time: f64) -> f64 {
        let dt = (time - self.print_time).clamp(0.0, self.duration);
        self.start_pos + self.velocity * dt
    }
}

/// Trajectory queue for a single stepper.
///
/// Segments that start before the committed time have (at least partly) been
/// handed to the MCU and stay queued until `finalize_moves` retires them.
#[derive(Debug, Clone, Default)]
pub struct TrapQueue {
    segments: VecDeque<TrapSegment>,
}

impl TrapQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, segment: TrapSegment) {
        self.segments.push_back(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &TrapSegment> {
        self.segments.iter()
    }

    /// Print time at which the last queued segment ends.
    pub fn end_time(&self) -> Option<f64> {
        self.segments.back().map(TrapSegment::end_time)
    }

    /// Segments with any part not yet committed at `committed_time`.
    pub fn pending_after(&self, committed_time: f64) -> usize {
        self.segments
            .iter()
            .filter(|s| s.end_time() > committed_time)
            .count()
    }

    /// Drop everything the executor has not taken yet.
    ///
    /// Segments starting at or after `committed_time` are removed; a segment
    /// straddling it is cut short so the committed part survives. Returns the
    /// number of segments removed or truncated.
    pub fn discard_after(&mut self, committed_time: f64) -> usize {
        let before = self.segments.len();
        self.segments.retain(|s| s.print_time < committed_time);
        let mut touched = before - self.segments.len();
        if let Some(last) = self.segments.back_mut() {
            if last.end_time() > committed_time {
                last.duration = committed_time - last.print_time;
                touched += 1;
            }
        }
        touched
    }

    /// Retire segments that finished at or before `time`.
    pub fn finalize_moves(&mut self, time: f64) -> usize {
        let mut count = 0;
        while let Some(front) = self.segments.front() {
            if front.end_time() > time {
                break;
            }
            self.segments.pop_front();
            count += 1;
        }
        count
    }
}

/// Owns the timing watermark and applies it to step generation and to
/// trapq wipes.
#[derive(Debug, Clone)]
pub struct MotionQueuing {
    watermark: TimingWatermark,
    step_gen_window: f64,
}

impl MotionQueuing {
    pub fn new(safety_margin: f64, step_gen_window: f64) -> Self {
        Self {
            watermark: TimingWatermark::new(safety_margin),
            step_gen_window,
        }
    }

    pub fn watermark(&self) -> &TimingWatermark {
        &self.watermark
    }

    pub fn watermark_mut(&mut self) -> &mut TimingWatermark {
        &mut self.watermark
    }

    /// How far ahead of the estimated print time steps are generated.
    pub fn step_gen_window(&self) -> f64 {
        self.step_gen_window
    }

    /// Commit motion up to `up_to`, but never past the generation gate.
    /// Returns the committed time after the call.
    pub fn generate_steps(&mut self, up_to: f64) -> f64 {
        let target = up_to.min(self.watermark.next_generation_time());
        if target > self.watermark.last_committed_time() {
            tracing::debug!(
                "Generating steps {:.3} -> {:.3}",
                self.watermark.last_committed_time(),
                target
            );
            self.watermark.advance_committed(target);
            self.watermark
                .advance_flushed(target.min(self.watermark.next_flush_time()));
        }
        self.watermark.last_committed_time()
    }

    /// Wipe the uncommitted part of a stepper's trajectory queue.
    ///
    /// A stepper without a queue is not an error; nothing is discarded.
    pub fn discard_pending(&self, trapq: Option<&mut TrapQueue>) -> usize {
        match trapq {
            Some(trapq) => trapq.discard_after(self.watermark.last_committed_time()),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(print_time: f64, duration: f64) -> TrapSegment {
        TrapSegment {
            print_time,
            duration,
            start_pos: 0.0,
            velocity: 10.0,
        }
    }

    #[test]
    fn test_segment_positions() {
        let s = TrapSegment { print_time: 1.0, duration: 2.0, start_pos: 5.0, velocity: -1.5 };
        assert_eq!(s.end_time(), 3.0);
        assert_eq!(s.position_at(0.0), 5.0);
        assert_eq!(s.position_at(2.0), 3.5);
        assert_eq!(s.end_pos(), 2.0);
    }

    #[test]
    fn test_discard_after_keeps_committed_history() {
        let mut q = TrapQueue::new();
        q.append(segment(0.0, 1.0));
        q.append(segment(1.0, 1.0));
        q.append(segment(2.0, 1.0));
        let touched = q.discard_after(1.5);
        assert_eq!(touched, 2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.end_time(), Some(1.5));
        assert_eq!(q.pending_after(1.5), 0);
    }

    #[test]
    fn test_discard_after_on_empty_queue() {
        let mut q = TrapQueue::new();
        assert_eq!(q.discard_after(10.0), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_discard_twice_is_noop() {
        let mut q = TrapQueue::new();
        q.append(segment(0.0, 4.0));
        assert_eq!(q.discard_after(1.0), 1);
        assert_eq!(q.discard_after(1.0), 0);
        assert_eq!(q.end_time(), Some(1.0));
    }

    #[test]
    fn test_finalize_moves_retires_finished_segments() {
        let mut q = TrapQueue::new();
        q.append(segment(0.0, 1.0));
        q.append(segment(1.0, 1.0));
        assert_eq!(q.finalize_moves(1.0), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.finalize_moves(1.5), 0);
    }

    #[test]
    fn test_generate_steps_stops_at_gate() {
        let mut mq = MotionQueuing::new(0.1, 0.7);
        mq.watermark_mut().request_generation(2.0);
        assert_eq!(mq.generate_steps(5.0), 2.0);
        assert_eq!(mq.watermark().last_flushed_time(), 2.0);
        // nothing past the gate without a new request
        assert_eq!(mq.generate_steps(6.0), 2.0);
    }

    #[test]
    fn test_discard_pending_without_trapq() {
        let mq = MotionQueuing::new(0.1, 0.7);
        assert_eq!(mq.discard_pending(None), 0);
    }
}
