//! Contains the data models for API requests and responses.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stop::status::{PumpStatus, StatusSnapshot};
use crate::stop::{StopFailure, StopPhase, StopReport};

/// Body of `enose/pump_stop` and `enose/async_stop`. Every field is optional;
/// an empty body stops the configured pumps.
#[derive(Debug, Default, Deserialize)]
pub struct PumpStopRequest {
    #[serde(default)]
    pub pumps: Vec<String>,
}

/// Result of a completed stop.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: String,
    pub message: String,
    pub request_id: Uuid,
    pub stopped: Vec<String>,
    pub already_stopped: Vec<String>,
    pub errors: Vec<StopErrorEntry>,
    /// Seconds of committed motion that may still execute.
    pub residual_motion: f64,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StopErrorEntry {
    pub pump: String,
    pub error: String,
}

impl From<&StopFailure> for StopErrorEntry {
    fn from(failure: &StopFailure) -> Self {
        Self {
            pump: failure.pump.clone(),
            error: failure.reason.clone(),
        }
    }
}

impl StopResponse {
    pub fn from_report(report: &StopReport, label: &str) -> Self {
        Self {
            status: "stopped".to_string(),
            message: report.summary(label),
            request_id: report.request_id,
            stopped: report.stopped.clone(),
            already_stopped: report.already_stopped.clone(),
            errors: report.errors.iter().map(StopErrorEntry::from).collect(),
            residual_motion: report.residual_motion,
            reported_at: Utc::now(),
        }
    }
}

/// The stop was scheduled, not completed.
#[derive(Debug, Serialize)]
pub struct AsyncStopResponse {
    pub scheduled: bool,
    pub request_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub plugin_version: String,
    pub pumps: BTreeMap<String, PumpStatusEntry>,
    pub in_flight: bool,
    pub phase: StopPhase,
    pub completed_stops: u64,
    pub lookahead_moves: usize,
    pub next_generation_time: f64,
    pub last_committed_time: f64,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PumpStatusEntry {
    Present {
        registered: bool,
        axis: Option<u8>,
        enabled: bool,
    },
    Missing {
        error: String,
    },
}

impl From<&PumpStatus> for PumpStatusEntry {
    fn from(status: &PumpStatus) -> Self {
        match status {
            PumpStatus::Present { registered, axis, enabled } => PumpStatusEntry::Present {
                registered: *registered,
                axis: axis.map(|a| a.0),
                enabled: *enabled,
            },
            PumpStatus::Missing { error } => PumpStatusEntry::Missing { error: error.clone() },
        }
    }
}

impl From<StatusSnapshot> for StatusResponse {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            plugin_version: snapshot.plugin_version.to_string(),
            pumps: snapshot
                .pumps
                .iter()
                .map(|entry| (entry.name.clone(), PumpStatusEntry::from(&entry.status)))
                .collect(),
            in_flight: snapshot.in_flight,
            phase: snapshot.phase,
            completed_stops: snapshot.completed_stops,
            lookahead_moves: snapshot.lookahead_len,
            next_generation_time: snapshot.watermark.next_generation_time(),
            last_committed_time: snapshot.watermark.last_committed_time(),
            reported_at: Utc::now(),
        }
    }
}

/// Represents a request to execute an operator command.
#[derive(Debug, Deserialize)]
pub struct GcodeCommandRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct GcodeResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
