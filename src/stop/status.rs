// src/stop/status.rs - Read-only pump status snapshot
use serde::Serialize;

use crate::motion::registry::AxisId;
use crate::motion::watermark::TimingWatermark;
use crate::printer::Printer;
use crate::stop::StopPhase;

pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Operator commands, with their help text.
pub const COMMANDS: &[(&str, &str)] = &[
    ("CANCEL_ALL", "Stop all configured pumps now"),
    ("CANCEL_PUMPS", "Stop the pumps listed in PUMPS=a,b"),
    ("CANCEL_ASYNC", "Schedule a pump stop ahead of queued commands"),
    ("FAST_STOP", "Emergency stop: cancel motion and disable every stepper"),
    ("STATUS", "Report pump registration and stop state"),
];

/// Remote endpoints, relative to `/api/v1`.
pub const ENDPOINTS: &[&str] = &[
    "enose/pump_stop",
    "enose/fast_stop",
    "enose/async_stop",
    "enose/status",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PumpStatus {
    Present {
        registered: bool,
        axis: Option<AxisId>,
        enabled: bool,
    },
    Missing {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpEntry {
    pub name: String,
    pub status: PumpStatus,
}

/// Best-effort snapshot; may be stale by the time it is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub plugin_version: &'static str,
    pub pumps: Vec<PumpEntry>,
    pub in_flight: bool,
    pub phase: StopPhase,
    pub completed_stops: u64,
    pub lookahead_len: usize,
    pub watermark: TimingWatermark,
}

pub fn snapshot(printer: &Printer) -> StatusSnapshot {
    let pumps = printer
        .pump_names()
        .iter()
        .map(|name| {
            let status = match printer.steppers().lookup(name) {
                Ok(stepper) => {
                    let axis = printer.registry().axis_of(name);
                    PumpStatus::Present {
                        registered: axis.is_some(),
                        axis,
                        enabled: stepper.is_enabled(),
                    }
                }
                Err(_) => PumpStatus::Missing { error: "not found".to_string() },
            };
            PumpEntry { name: name.clone(), status }
        })
        .collect();
    let stop = printer.stop_controller();
    StatusSnapshot {
        plugin_version: PLUGIN_VERSION,
        pumps,
        in_flight: stop.in_flight(),
        phase: stop.phase(),
        completed_stops: stop.completed(),
        lookahead_len: printer.lookahead().len(),
        watermark: *printer.watermark(),
    }
}

impl StatusSnapshot {
    pub fn pump(&self, name: &str) -> Option<&PumpStatus> {
        self.pumps.iter().find(|p| p.name == name).map(|p| &p.status)
    }

    /// Multi-line text report for the operator console.
    pub fn render(&self) -> String {
        let names: Vec<&str> = self.pumps.iter().map(|p| p.name.as_str()).collect();
        let mut lines = vec![
            format!("E-Nose Control v{}", self.plugin_version),
            format!("Configured pumps: {}", names.join(", ")),
        ];
        for entry in &self.pumps {
            let line = match &entry.status {
                PumpStatus::Present { axis: Some(axis), enabled, .. } => {
                    format!("  {}: registered as axis {}{}", entry.name, axis, enabled_suffix(*enabled))
                }
                PumpStatus::Present { axis: None, enabled, .. } => {
                    format!("  {}: not registered{}", entry.name, enabled_suffix(*enabled))
                }
                PumpStatus::Missing { .. } => format!("  {}: not found", entry.name),
            };
            lines.push(line);
        }
        lines.push(format!(
            "Stop in flight: {}",
            if self.in_flight { "yes" } else { "no" }
        ));
        let commands: Vec<&str> = COMMANDS.iter().map(|(name, _)| *name).collect();
        lines.push(format!("Commands: {}", commands.join(", ")));
        lines.push(format!("Webhooks: {}", ENDPOINTS.join(", ")));
        lines.join("\n")
    }
}

fn enabled_suffix(enabled: bool) -> &'static str {
    if enabled { " (enabled)" } else { "" }
}
