// src/printer.rs - The printer object: owns every piece of motion state
use std::collections::VecDeque;

use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::gcode::GCodeError;
use crate::hardware::{HardwareError, ManualStepper, StepperTable};
use crate::motion::lookahead::{LookaheadMove, LookaheadQueue, QueuingState};
use crate::motion::registry::{AxisId, AxisRegistry, RegistryError};
use crate::motion::trapq::{MotionQueuing, TrapSegment};
use crate::motion::watermark::TimingWatermark;
use crate::motion::MotionError;
use crate::scheduler::{ClockError, McuClock, Priority, Reactor, ReactorJob, SchedulerError, TaskId};
use crate::stop::status::{self, StatusSnapshot};
use crate::stop::{self, StopController, StopError, StopReport, StopSource, StopTargets};

const CONSOLE_HISTORY: usize = 64;

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Stop failed: {0}")]
    Stop(#[from] StopError),
}

/// Single owner of the watermark, queues, registry and steppers.
///
/// Everything that mutates motion state takes `&mut Printer`, and reactor
/// callbacks receive it the same way, so there is exactly one writer.
pub struct Printer {
    pub(crate) config: Config,
    pub(crate) clock: Box<dyn McuClock>,
    pub(crate) motion_queuing: MotionQueuing,
    pub(crate) lookahead: LookaheadQueue,
    pub(crate) registry: AxisRegistry,
    pub(crate) steppers: StepperTable,
    pub(crate) stop: StopController,
    pub(crate) reactor: Reactor<Printer>,
    print_time: f64,
    console: VecDeque<String>,
}

impl Printer {
    pub fn new(config: Config, clock: Box<dyn McuClock>) -> Result<Self, PrinterError> {
        config.validate()?;

        let mut steppers = StepperTable::new();
        let mut registry = AxisRegistry::new();
        for (name, stepper_config) in &config.steppers {
            steppers.insert(ManualStepper::new(name, stepper_config.has_trapq))?;
            if let Some(axis) = stepper_config.axis {
                registry.register(name, axis)?;
            }
        }
        for missing in config.missing_pumps() {
            tracing::warn!("Pump '{}' has no manual_stepper section", missing);
        }
        tracing::info!(
            "EnoseControl: {} steppers, pumps: {:?}",
            steppers.len(),
            config.enose_control.pump_names
        );

        Ok(Self {
            motion_queuing: MotionQueuing::new(
                config.motion.safety_margin,
                config.motion.step_gen_window,
            ),
            lookahead: LookaheadQueue::new(),
            registry,
            steppers,
            stop: StopController::new(),
            reactor: Reactor::new(config.reactor.capacity),
            print_time: 0.0,
            console: VecDeque::new(),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pump_names(&self) -> &[String] {
        &self.config.enose_control.pump_names
    }

    pub fn watermark(&self) -> &TimingWatermark {
        self.motion_queuing.watermark()
    }

    pub fn registry(&self) -> &AxisRegistry {
        &self.registry
    }

    pub fn steppers(&self) -> &StepperTable {
        &self.steppers
    }

    pub fn stepper(&self, name: &str) -> Result<&ManualStepper, HardwareError> {
        self.steppers.lookup(name)
    }

    pub fn lookahead(&self) -> &LookaheadQueue {
        &self.lookahead
    }

    pub fn stop_controller(&self) -> &StopController {
        &self.stop
    }

    pub fn pending_callbacks(&self) -> usize {
        self.reactor.pending()
    }

    pub fn estimated_print_time(&self) -> Result<f64, ClockError> {
        self.clock.estimated_print_time(self.clock.monotonic())
    }

    // --- console -------------------------------------------------------

    pub fn respond_info(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!("{}", msg);
        if self.console.len() == CONSOLE_HISTORY {
            self.console.pop_front();
        }
        self.console.push_back(msg);
    }

    /// Take every console response produced since the last call.
    pub fn take_responses(&mut self) -> Vec<String> {
        self.console.drain(..).collect()
    }

    // --- stepper and axis management -----------------------------------

    pub fn enable_stepper(&mut self, name: &str, enable: bool) -> Result<(), PrinterError> {
        self.steppers.lookup_mut(name)?.do_enable(enable);
        Ok(())
    }

    pub fn set_position(&mut self, name: &str, position: f64) -> Result<(), PrinterError> {
        self.steppers.lookup_mut(name)?.reset_position(position);
        Ok(())
    }

    pub fn register_axis(&mut self, name: &str, axis: AxisId) -> Result<(), PrinterError> {
        self.steppers.lookup(name)?;
        self.registry.register(name, axis)?;
        tracing::info!("Registered {} as GCODE_AXIS {}", name, axis);
        Ok(())
    }

    pub fn unregister_axis(&mut self, name: &str) -> Result<Option<AxisId>, PrinterError> {
        self.steppers.lookup(name)?;
        Ok(self.registry.unregister(name))
    }

    // --- motion --------------------------------------------------------

    /// Queue a relative constant-velocity move into the lookahead queue.
    pub fn queue_move(&mut self, name: &str, distance: f64, speed: f64) -> Result<(), PrinterError> {
        let stepper = self.steppers.lookup_mut(name)?;
        if !stepper.is_enabled() {
            return Err(MotionError::Disabled(name.to_string()).into());
        }
        if !distance.is_finite() || !speed.is_finite() || speed <= 0.0 {
            return Err(MotionError::InvalidMove {
                stepper: name.to_string(),
                reason: format!("distance={} speed={}", distance, speed),
            }
            .into());
        }
        if distance == 0.0 {
            return Ok(());
        }
        let start_pos = stepper.position();
        let end_pos = start_pos + distance;
        stepper.move_to(end_pos);
        self.lookahead.add_move(LookaheadMove {
            stepper: name.to_string(),
            start_pos,
            end_pos,
            speed,
        });
        Ok(())
    }

    /// Queue a move through a registered axis slot.
    pub fn queue_axis_move(&mut self, axis: AxisId, distance: f64, speed: f64) -> Result<(), PrinterError> {
        let name = self
            .registry
            .actuator_on(axis)
            .ok_or(MotionError::AxisNotRegistered(axis))?
            .to_string();
        self.queue_move(&name, distance, speed)
    }

    /// Assign print times to every lookahead move and append them to the
    /// trapqs. Returns the number of moves flushed.
    pub fn flush_lookahead(&mut self) -> Result<usize, PrinterError> {
        if self.lookahead.is_empty() {
            return Ok(0);
        }
        let est_print_time = self.estimated_print_time()?;
        let watermark = self.motion_queuing.watermark();
        let earliest =
            est_print_time.max(watermark.last_committed_time()) + watermark.safety_margin();
        if self.lookahead.state() == QueuingState::NeedPrime {
            self.print_time = earliest;
            self.lookahead.set_state(QueuingState::Main);
        } else {
            self.print_time = self.print_time.max(earliest);
        }

        let moves = self.lookahead.drain();
        let count = moves.len();
        for mv in moves {
            let duration = mv.duration();
            let stepper = self.steppers.lookup_mut(&mv.stepper)?;
            if let Some(trapq) = stepper.trapq_mut() {
                let direction = if mv.end_pos >= mv.start_pos { 1.0 } else { -1.0 };
                trapq.append(TrapSegment {
                    print_time: self.print_time,
                    duration,
                    start_pos: mv.start_pos,
                    velocity: direction * mv.speed,
                });
            }
            self.print_time += duration;
        }
        self.motion_queuing
            .watermark_mut()
            .request_generation(self.print_time);
        tracing::debug!("Flushed {} moves, print_time={:.3}", count, self.print_time);
        Ok(count)
    }

    /// Generate steps up to the step generation window ahead of the MCU.
    /// Returns the committed print time.
    pub fn generate_steps(&mut self) -> Result<f64, PrinterError> {
        let est_print_time = self.estimated_print_time()?;
        let up_to = est_print_time + self.motion_queuing.step_gen_window();
        let committed = self.motion_queuing.generate_steps(up_to);
        for stepper in self.steppers.iter_mut() {
            if let Some(trapq) = stepper.trapq_mut() {
                trapq.finalize_moves(committed);
            }
        }
        Ok(committed)
    }

    // --- reactor -------------------------------------------------------

    /// Queue a normal callback behind everything already pending.
    pub fn schedule(&mut self, job: ReactorJob<Printer>) -> Result<TaskId, SchedulerError> {
        self.reactor.register_callback(job)
    }

    /// Queue a callback that runs before any pending normal callback.
    pub fn schedule_immediate(&mut self, job: ReactorJob<Printer>) -> Result<TaskId, SchedulerError> {
        self.reactor.register_async_callback(job)
    }

    /// Queue an operator command line as normal work. The response goes to
    /// the console.
    pub fn submit(&mut self, line: &str) -> Result<TaskId, SchedulerError> {
        let line = line.to_string();
        self.submit_with(line.clone(), move |printer, result| match result {
            Ok(response) => printer.respond_info(response),
            Err(e) => printer.respond_info(format!("{} failed: {}", line, e)),
        })
    }

    /// Queue an operator command line as normal work and hand its result to
    /// `on_done` once it has run. `on_done` is dropped unrun if scheduling
    /// fails.
    pub fn submit_with<F>(&mut self, line: String, on_done: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&mut Printer, Result<String, GCodeError>) + 'static,
    {
        self.schedule(Box::new(move |printer: &mut Printer, _eventtime| {
            let result = crate::gcode::run_line(printer, &line);
            on_done(printer, result);
        }))
    }

    /// Run the next pending callback, immediate work first.
    pub fn run_next(&mut self) -> Option<Priority> {
        let (id, priority, job) = self.reactor.pop_next()?;
        let eventtime = self.clock.monotonic();
        tracing::debug!("Running {:?} callback {} at {:.3}", priority, id.0, eventtime);
        job(self, eventtime);
        Some(priority)
    }

    /// Drain the reactor, including callbacks queued by callbacks.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while self.run_next().is_some() {
            ran += 1;
        }
        ran
    }

    pub fn shutdown(&mut self) {
        if self.reactor.is_closed() {
            return;
        }
        tracing::info!(
            "Shutting down reactor with {} callbacks pending ({} immediate)",
            self.reactor.pending(),
            self.reactor.pending_immediate()
        );
        self.reactor.shutdown();
    }

    // --- stop ----------------------------------------------------------

    /// Stop now, inside the caller's turn.
    pub fn cancel(&mut self, targets: StopTargets) -> Result<StopReport, StopError> {
        let request = self.stop.request(targets, StopSource::Command);
        stop::execute(self, request)
    }

    /// Stop now on behalf of a remote caller.
    pub fn cancel_remote(&mut self, targets: StopTargets) -> Result<StopReport, StopError> {
        let request = self.stop.request(targets, StopSource::Remote);
        stop::execute(self, request)
    }

    /// Schedule a stop on the immediate path. Returns as soon as the callback
    /// is registered; the stop itself has not run yet.
    pub fn schedule_cancel(&mut self, targets: StopTargets) -> Result<Uuid, SchedulerError> {
        let request = self.stop.request(targets, StopSource::Immediate);
        let request_id = request.id;
        let job: ReactorJob<Printer> = Box::new(move |printer: &mut Printer, eventtime| {
            tracing::info!("Async stop {} executing at eventtime={:.3}", request.id, eventtime);
            match stop::execute(printer, request) {
                Ok(report) => printer.respond_info(report.summary("CANCEL_ASYNC")),
                Err(e) => printer.respond_info(format!("CANCEL_ASYNC failed: {}", e)),
            }
        });
        if let Err(e) = self.reactor.register_async_callback(job) {
            self.stop.abandon();
            tracing::warn!("Async stop {} could not be scheduled: {}", request_id, e);
            return Err(e);
        }
        tracing::info!("Async stop {} scheduled", request_id);
        Ok(request_id)
    }

    pub fn status(&self) -> StatusSnapshot {
        status::snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;

    fn printer_at(print_time: f64) -> (Printer, ManualClock) {
        let clock = ManualClock::new(print_time);
        let printer = Printer::new(Config::default(), Box::new(clock.clone())).unwrap();
        (printer, clock)
    }

    #[test]
    fn test_default_printer_has_four_pumps() {
        let (printer, _) = printer_at(0.0);
        assert_eq!(printer.steppers().len(), 4);
        assert!(printer.registry().is_empty());
        assert!(printer.stepper("pump_2").unwrap().trapq().is_some());
    }

    #[test]
    fn test_move_requires_enabled_stepper() {
        let (mut printer, _) = printer_at(0.0);
        let err = printer.queue_move("pump_2", 5.0, 1.0).unwrap_err();
        assert!(matches!(err, PrinterError::Motion(MotionError::Disabled(_))));
        printer.enable_stepper("pump_2", true).unwrap();
        printer.queue_move("pump_2", 5.0, 1.0).unwrap();
        assert_eq!(printer.lookahead().len(), 1);
        assert_eq!(printer.stepper("pump_2").unwrap().position(), 5.0);
    }

    #[test]
    fn test_invalid_moves_rejected() {
        let (mut printer, _) = printer_at(0.0);
        printer.enable_stepper("pump_2", true).unwrap();
        assert!(printer.queue_move("pump_2", 1.0, 0.0).is_err());
        assert!(printer.queue_move("pump_2", f64::NAN, 1.0).is_err());
        assert!(printer.queue_move("pump_9", 1.0, 1.0).is_err());
    }

    #[test]
    fn test_flush_and_generate_respect_the_gate() {
        let (mut printer, clock) = printer_at(1.0);
        printer.enable_stepper("pump_2", true).unwrap();
        printer.queue_move("pump_2", 10.0, 2.0).unwrap();
        assert_eq!(printer.flush_lookahead().unwrap(), 1);

        // move starts at 1.0 + margin and lasts 5s
        let segment = *printer.stepper("pump_2").unwrap().trapq().unwrap().segments().next().unwrap();
        assert!((segment.print_time - 1.1).abs() < 1e-9);
        assert!((printer.watermark().next_generation_time() - 6.1).abs() < 1e-9);

        // window is 0.7s ahead of the MCU
        let committed = printer.generate_steps().unwrap();
        assert!((committed - 1.7).abs() < 1e-9);

        clock.advance(10.0);
        let committed = printer.generate_steps().unwrap();
        assert!((committed - 6.1).abs() < 1e-9);
        assert!(printer.stepper("pump_2").unwrap().trapq().unwrap().is_empty());
    }

    #[test]
    fn test_axis_move_needs_registration() {
        let (mut printer, _) = printer_at(0.0);
        printer.enable_stepper("pump_3", true).unwrap();
        let err = printer.queue_axis_move(AxisId(3), 1.0, 1.0).unwrap_err();
        assert!(matches!(err, PrinterError::Motion(MotionError::AxisNotRegistered(AxisId(3)))));
        printer.register_axis("pump_3", AxisId(3)).unwrap();
        printer.queue_axis_move(AxisId(3), 1.0, 1.0).unwrap();
        assert_eq!(printer.lookahead().len(), 1);
    }

    #[test]
    fn test_submitted_command_answers_when_run() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let (mut printer, _) = printer_at(0.0);
        let answer = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&answer);
        printer
            .submit_with("MANUAL_STEPPER STEPPER=pump_2 ENABLE=1".into(), move |_, result| {
                *slot.borrow_mut() = Some(result.map_err(|e| e.to_string()));
            })
            .unwrap();
        assert!(answer.borrow().is_none());
        assert!(!printer.stepper("pump_2").unwrap().is_enabled());

        assert_eq!(printer.run_pending(), 1);
        assert_eq!(*answer.borrow(), Some(Ok("pump_2: ok".to_string())));
        assert!(printer.stepper("pump_2").unwrap().is_enabled());
    }

    #[test]
    fn test_console_history_is_bounded() {
        let (mut printer, _) = printer_at(0.0);
        for i in 0..(CONSOLE_HISTORY + 5) {
            printer.respond_info(format!("line {}", i));
        }
        let lines = printer.take_responses();
        assert_eq!(lines.len(), CONSOLE_HISTORY);
        assert_eq!(lines[0], "line 5");
        assert!(printer.take_responses().is_empty());
    }
}
