// src/gcode/mod.rs - Extended operator commands (NAME KEY=VALUE ...)
use std::collections::HashMap;

use thiserror::Error;

use crate::motion::registry::AxisId;
use crate::printer::{Printer, PrinterError};
use crate::stop::{StopError, StopTargets};
use crate::scheduler::SchedulerError;

/// Speed used by MOVE when SPEED is omitted (mm/s).
pub const DEFAULT_MOVE_SPEED: f64 = 10.0;

#[derive(Debug, Error)]
pub enum GCodeError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Malformed parameter '{0}', expected KEY=VALUE")]
    MalformedParameter(String),
    #[error("Missing parameter {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for {param}: '{value}'")]
    InvalidValue { param: String, value: String },
    #[error("{0}")]
    Printer(#[from] PrinterError),
    #[error("{0}")]
    Stop(#[from] StopError),
    #[error("Unable to schedule callback: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GCodeCommand {
    pub command: String,
    pub parameters: HashMap<String, String>,
}

impl GCodeCommand {
    /// Parse one line. Command names and parameter keys are case-insensitive;
    /// anything after ';' is a comment.
    pub fn parse(line: &str) -> Result<Self, GCodeError> {
        let line = line.split(';').next().unwrap_or("").trim();
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(GCodeError::Empty)?.to_ascii_uppercase();
        let mut parameters = HashMap::new();
        for word in words {
            let (key, value) = word
                .split_once('=')
                .ok_or_else(|| GCodeError::MalformedParameter(word.to_string()))?;
            if key.is_empty() {
                return Err(GCodeError::MalformedParameter(word.to_string()));
            }
            parameters.insert(key.to_ascii_uppercase(), value.to_string());
        }
        Ok(Self { command, parameters })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &'static str) -> Result<&str, GCodeError> {
        self.get(key).ok_or(GCodeError::MissingParameter(key))
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, GCodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(key, value)),
        }
    }

    fn get_axis(&self, key: &str, value: &str) -> Result<AxisId, GCodeError> {
        value.parse::<u8>().map(AxisId).map_err(|_| invalid(key, value))
    }

    /// Comma separated list, empty entries dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn invalid(param: &str, value: &str) -> GCodeError {
    GCodeError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
    }
}

/// Parse and run one command line against the printer, returning the
/// operator-facing response.
pub fn run_line(printer: &mut Printer, line: &str) -> Result<String, GCodeError> {
    let command = GCodeCommand::parse(line)?;
    dispatch(printer, &command)
}

pub fn dispatch(printer: &mut Printer, command: &GCodeCommand) -> Result<String, GCodeError> {
    tracing::debug!("Processing command: {}", command.command);
    match command.command.as_str() {
        "CANCEL_ALL" => cmd_cancel_all(printer),
        "CANCEL_PUMPS" => cmd_cancel_pumps(printer, command),
        "CANCEL_ASYNC" => cmd_cancel_async(printer, command),
        "FAST_STOP" => cmd_fast_stop(printer),
        "STATUS" => Ok(printer.status().render()),
        "MANUAL_STEPPER" => cmd_manual_stepper(printer, command),
        "AXIS_MOVE" => cmd_axis_move(printer, command),
        other => {
            tracing::warn!("Unhandled command: {}", other);
            Err(GCodeError::UnknownCommand(other.to_string()))
        }
    }
}

fn cmd_cancel_all(printer: &mut Printer) -> Result<String, GCodeError> {
    let report = printer.cancel(StopTargets::Configured)?;
    Ok(report.summary("CANCEL_ALL"))
}

fn cmd_cancel_pumps(printer: &mut Printer, command: &GCodeCommand) -> Result<String, GCodeError> {
    let pumps = command.get_list("PUMPS");
    if pumps.is_empty() {
        return Err(GCodeError::MissingParameter("PUMPS"));
    }
    let report = printer.cancel(StopTargets::Pumps(pumps))?;
    Ok(report.summary("CANCEL_PUMPS"))
}

fn cmd_cancel_async(printer: &mut Printer, command: &GCodeCommand) -> Result<String, GCodeError> {
    let request_id = printer.schedule_cancel(StopTargets::Pumps(command.get_list("PUMPS")))?;
    Ok(format!("CANCEL_ASYNC: stop {} scheduled", request_id))
}

fn cmd_fast_stop(printer: &mut Printer) -> Result<String, GCodeError> {
    let report = printer.cancel(StopTargets::AllSteppers)?;
    Ok(report.summary("FAST_STOP"))
}

fn cmd_manual_stepper(printer: &mut Printer, command: &GCodeCommand) -> Result<String, GCodeError> {
    let name = command.require("STEPPER")?.to_string();
    printer.stepper(&name).map_err(PrinterError::from)?;

    if let Some(enable) = command.get("ENABLE") {
        let enable = match enable {
            "0" => false,
            "1" => true,
            other => return Err(invalid("ENABLE", other)),
        };
        printer.enable_stepper(&name, enable)?;
    }
    if let Some(position) = command.get_f64("SET_POSITION")? {
        printer.set_position(&name, position)?;
    }
    if let Some(target) = command.get_f64("MOVE")? {
        let speed = command.get_f64("SPEED")?.unwrap_or(DEFAULT_MOVE_SPEED);
        let distance = target - printer.stepper(&name).map_err(PrinterError::from)?.position();
        printer.queue_move(&name, distance, speed)?;
    }
    match command.get("GCODE_AXIS") {
        Some("") => {
            if let Some(axis) = printer.unregister_axis(&name)? {
                return Ok(format!("{} released axis {}", name, axis));
            }
        }
        Some(value) => {
            let axis = command.get_axis("GCODE_AXIS", value)?;
            printer.register_axis(&name, axis)?;
            return Ok(format!("{} registered as axis {}", name, axis));
        }
        None => {}
    }
    Ok(format!("{}: ok", name))
}

fn cmd_axis_move(printer: &mut Printer, command: &GCodeCommand) -> Result<String, GCodeError> {
    let axis_value = command.require("AXIS")?;
    let axis = command.get_axis("AXIS", axis_value)?;
    let target = command
        .get_f64("MOVE")?
        .ok_or(GCodeError::MissingParameter("MOVE"))?;
    let speed = command.get_f64("SPEED")?.unwrap_or(DEFAULT_MOVE_SPEED);
    let current = printer
        .registry()
        .actuator_on(axis)
        .and_then(|name| printer.stepper(name).ok())
        .map(|stepper| stepper.position())
        .unwrap_or(0.0);
    printer.queue_axis_move(axis, target - current, speed)?;
    Ok(format!("Axis {} moving to {}", axis, target))
}
