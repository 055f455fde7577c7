//! Pump stop: cancel in-flight motion on a set of manual steppers.
//!
//! A stop runs to completion inside one reactor turn, in this order:
//!
//! 1. sample the MCU print time and pull the generation/flush gates back to a
//!    safe cutover (never below what the MCU already owns);
//! 2. drop the whole lookahead queue, which by definition is uncommitted;
//! 3. per stepper: wipe the uncommitted part of its trapq, release its axis
//!    slot, disable it and optionally zero its logical position.
//!
//! Gates move before any trapq is touched; otherwise the step generator could
//! refill a trapq between the wipe and the gate update. Steps the MCU has
//! already accepted still run (up to `step_gen_window` of motion).
//!
//! Every step is idempotent, so stopping twice is harmless. A stepper that
//! cannot be resolved is recorded and skipped; it never aborts the batch.

pub mod status;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::hardware::HardwareError;
use crate::printer::Printer;
use crate::scheduler::ClockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPhase {
    Idle,
    Requested,
    Committing,
}

/// Which steppers a stop applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTargets {
    /// The configured `pump_names`, in order.
    Configured,
    /// An explicit subset. An empty list means `Configured`.
    Pumps(Vec<String>),
    /// Every configured stepper, pump or not.
    AllSteppers,
}

impl StopTargets {
    fn resolve(&self, printer: &Printer) -> Vec<String> {
        let names = match self {
            StopTargets::Pumps(names) if !names.is_empty() => names.clone(),
            StopTargets::Configured | StopTargets::Pumps(_) => printer.pump_names().to_vec(),
            StopTargets::AllSteppers => printer.steppers().names(),
        };
        let mut seen = Vec::with_capacity(names.len());
        for name in names {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    /// Operator command, run inline in the command's turn.
    Command,
    /// Async callback that jumps the normal command queue.
    Immediate,
    /// Remote request handled directly by the printer task.
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationRequest {
    pub id: Uuid,
    pub targets: StopTargets,
    pub source: StopSource,
    /// Another stop was already in flight when this one was requested.
    pub already_in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopFailure {
    pub pump: String,
    pub reason: String,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pump, self.reason)
    }
}

/// Outcome of one stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopReport {
    pub request_id: Uuid,
    /// Steppers that were doing something and are now stopped.
    pub stopped: Vec<String>,
    /// Steppers that were already idle, disabled and unregistered.
    pub already_stopped: Vec<String>,
    pub errors: Vec<StopFailure>,
    /// Print time the generation gates were pulled back to.
    pub cutover: f64,
    /// Seconds of already committed motion that will still execute.
    pub residual_motion: f64,
    pub lookahead_discarded: usize,
    pub segments_discarded: usize,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Operator-facing one-line summary.
    pub fn summary(&self, label: &str) -> String {
        let mut msg = format!("{}: ", label);
        if !self.stopped.is_empty() {
            msg.push_str(&format!("Stopped: {}. ", self.stopped.join(", ")));
        }
        if !self.already_stopped.is_empty() {
            msg.push_str(&format!("Already stopped: {}. ", self.already_stopped.join(", ")));
        }
        if !self.errors.is_empty() {
            let errors: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
            msg.push_str(&format!("Errors: {}. ", errors.join("; ")));
        }
        msg.push_str("Position lost - re-register GCODE_AXIS before next move.");
        msg
    }
}

/// Failures that abort a whole stop before anything is mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StopError {
    #[error("clock unavailable: {0}")]
    ClockUnavailable(#[from] ClockError),
}

/// Tracks stop requests between being triggered and completing.
#[derive(Debug, Clone, Default)]
pub struct StopController {
    pending: usize,
    committing: bool,
    completed: u64,
    last_report: Option<StopReport>,
}

impl StopController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> StopPhase {
        if self.committing {
            StopPhase::Committing
        } else if self.pending > 0 {
            StopPhase::Requested
        } else {
            StopPhase::Idle
        }
    }

    /// Latched from request until the stop completes (or is abandoned).
    pub fn in_flight(&self) -> bool {
        self.pending > 0
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn last_report(&self) -> Option<&StopReport> {
        self.last_report.as_ref()
    }

    pub fn request(&mut self, targets: StopTargets, source: StopSource) -> CancellationRequest {
        let already_in_flight = self.in_flight();
        self.pending += 1;
        CancellationRequest {
            id: Uuid::new_v4(),
            targets,
            source,
            already_in_flight,
        }
    }

    fn begin_commit(&mut self) {
        self.committing = true;
    }

    fn finish(&mut self, report: StopReport) {
        self.committing = false;
        self.pending = self.pending.saturating_sub(1);
        self.completed += 1;
        self.last_report = Some(report);
    }

    /// Release a request that will never run (scheduling failed or the stop
    /// aborted).
    pub(crate) fn abandon(&mut self) {
        self.committing = false;
        self.pending = self.pending.saturating_sub(1);
    }
}

enum StepperOutcome {
    Stopped,
    AlreadyStopped,
}

/// Run a previously requested stop to completion.
pub fn execute(printer: &mut Printer, request: CancellationRequest) -> Result<StopReport, StopError> {
    printer.stop.begin_commit();
    if request.already_in_flight {
        tracing::debug!("Stop {} overlaps an earlier request", request.id);
    }

    let eventtime = printer.clock.monotonic();
    let est_print_time = match printer.clock.estimated_print_time(eventtime) {
        Ok(t) => t,
        Err(e) => {
            printer.stop.abandon();
            tracing::error!("Stop {} aborted: {}", request.id, e);
            return Err(e.into());
        }
    };

    let watermark = printer.motion_queuing.watermark_mut();
    let old_generation_time = watermark.next_generation_time();
    let safe_cutover = watermark.compute_safe_cutover(est_print_time);
    let cutover = watermark.apply(safe_cutover);
    tracing::info!(
        "Reset next_generation_time from {:.3} to {:.3} (diff={:.3}s)",
        old_generation_time,
        cutover,
        old_generation_time - cutover
    );

    let lookahead_discarded = printer.lookahead.reset();
    if lookahead_discarded > 0 {
        tracing::info!("Dropped {} lookahead moves", lookahead_discarded);
    }

    let targets = request.targets.resolve(printer);
    let zero_position = printer.config.enose_control.zero_position_on_stop;
    let mut stopped = Vec::new();
    let mut already_stopped = Vec::new();
    let mut errors = Vec::new();
    let mut segments_discarded = 0;
    for name in targets {
        match stop_stepper(printer, &name, zero_position) {
            Ok((outcome, discarded)) => {
                segments_discarded += discarded;
                match outcome {
                    StepperOutcome::Stopped => stopped.push(name),
                    StepperOutcome::AlreadyStopped => already_stopped.push(name),
                }
            }
            Err(e) => {
                tracing::warn!("Could not stop {}: {}", name, e);
                errors.push(StopFailure { pump: name, reason: e.to_string() });
            }
        }
    }

    let residual_motion =
        (printer.motion_queuing.watermark().last_committed_time() - est_print_time).max(0.0);
    let report = StopReport {
        request_id: request.id,
        stopped,
        already_stopped,
        errors,
        cutover,
        residual_motion,
        lookahead_discarded,
        segments_discarded,
    };
    if report.is_clean() {
        tracing::info!(
            "Stop {} completed - stopped: {:?}, ~{:.2}s of motion may still execute",
            request.id,
            report.stopped,
            residual_motion
        );
    } else {
        tracing::warn!(
            "Stop {} completed with {} errors - stopped: {:?}, ~{:.2}s of motion may still execute",
            request.id,
            report.errors.len(),
            report.stopped,
            residual_motion
        );
    }
    printer.stop.finish(report.clone());
    Ok(report)
}

fn stop_stepper(
    printer: &mut Printer,
    name: &str,
    zero_position: bool,
) -> Result<(StepperOutcome, usize), HardwareError> {
    let stepper = printer.steppers.lookup_mut(name)?;
    let committed = printer.motion_queuing.watermark().last_committed_time();
    let had_pending = stepper
        .trapq()
        .is_some_and(|q| q.pending_after(committed) > 0);
    let was_registered = printer.registry.axis_of(name).is_some();
    let was_active = stepper.is_enabled() || was_registered || had_pending;

    let discarded = printer.motion_queuing.discard_pending(stepper.trapq_mut());
    if discarded > 0 {
        tracing::info!("Wiped trapq for {} ({} segments)", name, discarded);
    }
    if let Some(axis) = printer.registry.unregister(name) {
        tracing::info!("Unregistered {} from GCODE_AXIS {}", name, axis);
    }
    stepper.disable();
    if zero_position {
        stepper.reset_position(0.0);
    }

    let outcome = if was_active {
        StepperOutcome::Stopped
    } else {
        StepperOutcome::AlreadyStopped
    };
    Ok((outcome, discarded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_phases() {
        let mut ctl = StopController::new();
        assert_eq!(ctl.phase(), StopPhase::Idle);
        let first = ctl.request(StopTargets::Configured, StopSource::Command);
        assert!(!first.already_in_flight);
        assert_eq!(ctl.phase(), StopPhase::Requested);
        let second = ctl.request(StopTargets::Configured, StopSource::Immediate);
        assert!(second.already_in_flight);
        assert_ne!(first.id, second.id);

        ctl.begin_commit();
        assert_eq!(ctl.phase(), StopPhase::Committing);
        ctl.abandon();
        assert_eq!(ctl.phase(), StopPhase::Requested);
        assert!(ctl.in_flight());
        ctl.abandon();
        assert!(!ctl.in_flight());
        assert_eq!(ctl.phase(), StopPhase::Idle);
        // never underflows
        ctl.abandon();
        assert_eq!(ctl.phase(), StopPhase::Idle);
    }

    #[test]
    fn test_summary_lists_each_group() {
        let report = StopReport {
            request_id: Uuid::nil(),
            stopped: vec!["pump_2".into(), "pump_3".into()],
            already_stopped: vec!["pump_4".into()],
            errors: vec![StopFailure { pump: "pump_5".into(), reason: "not found".into() }],
            cutover: 1.0,
            residual_motion: 0.0,
            lookahead_discarded: 0,
            segments_discarded: 0,
        };
        assert_eq!(
            report.summary("CANCEL_ALL"),
            "CANCEL_ALL: Stopped: pump_2, pump_3. Already stopped: pump_4. \
             Errors: pump_5: not found. Position lost - re-register GCODE_AXIS before next move."
        );
        assert!(!report.is_clean());
    }
}
