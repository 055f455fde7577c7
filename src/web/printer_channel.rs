//! Defines the communication channel messages between the web server and the printer task.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::models::{StatusResponse, StopResponse};
use crate::printer::Printer;
use crate::stop::StopTargets;

/// Represents a request sent from a web handler to the main printer task.
#[derive(Debug)]
pub enum PrinterRequest {
    /// A request to get the current pump status.
    GetStatus {
        /// The channel to send the response back on.
        respond_to: oneshot::Sender<StatusResponse>,
    },
    /// Stop the given pumps (configured pumps when empty) right now.
    PumpStop {
        pumps: Vec<String>,
        respond_to: oneshot::Sender<Result<StopResponse, String>>,
    },
    /// Stop every configured stepper.
    FastStop {
        respond_to: oneshot::Sender<Result<StopResponse, String>>,
    },
    /// Schedule a stop on the immediate path and answer without waiting for it.
    AsyncStop {
        pumps: Vec<String>,
        respond_to: oneshot::Sender<Result<Uuid, String>>,
    },
    /// A request to execute an operator command.
    ExecuteGcode {
        command: String,
        respond_to: oneshot::Sender<Result<String, String>>,
    },
}

/// Serve one request against the printer. Stops run inline, in this turn.
/// Command lines are queued as normal reactor work and answered once they
/// run, so they never overtake an immediate callback that is already pending.
pub fn handle_request(printer: &mut Printer, request: PrinterRequest) {
    match request {
        PrinterRequest::GetStatus { respond_to } => {
            let _ = respond_to.send(printer.status().into());
        }
        PrinterRequest::PumpStop { pumps, respond_to } => {
            let label = if pumps.is_empty() { "CANCEL_ALL" } else { "CANCEL_PUMPS" };
            let result = printer
                .cancel_remote(StopTargets::Pumps(pumps))
                .map(|report| StopResponse::from_report(&report, label))
                .map_err(|e| e.to_string());
            let _ = respond_to.send(result);
        }
        PrinterRequest::FastStop { respond_to } => {
            let result = printer
                .cancel_remote(StopTargets::AllSteppers)
                .map(|report| StopResponse::from_report(&report, "FAST_STOP"))
                .map_err(|e| e.to_string());
            let _ = respond_to.send(result);
        }
        PrinterRequest::AsyncStop { pumps, respond_to } => {
            let result = printer
                .schedule_cancel(StopTargets::Pumps(pumps))
                .map_err(|e| e.to_string());
            let _ = respond_to.send(result);
        }
        PrinterRequest::ExecuteGcode { command, respond_to } => {
            let scheduled = printer.submit_with(command.clone(), move |_printer, result| {
                let _ = respond_to.send(result.map_err(|e| e.to_string()));
            });
            if let Err(e) = scheduled {
                tracing::warn!("Dropping command '{}': {}", command, e);
            }
        }
    }
}

/// Printer task: serves web requests and drives the reactor and step
/// generation on a fixed tick. The reactor is drained after every request,
/// so immediate work scheduled by one request runs before the next request
/// is served. Must run on a `LocalSet`; the printer is not `Send`.
pub async fn run_printer_task(
    mut printer: Printer,
    mut printer_rx: mpsc::Receiver<PrinterRequest>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            request = printer_rx.recv() => match request {
                Some(request) => {
                    handle_request(&mut printer, request);
                    printer.run_pending();
                }
                None => break,
            },
            _ = interval.tick() => {
                printer.run_pending();
                if let Err(e) = printer.flush_lookahead() {
                    tracing::warn!("Lookahead flush failed: {}", e);
                }
                if let Err(e) = printer.generate_steps() {
                    tracing::warn!("Step generation failed: {}", e);
                }
            }
        }
    }
    printer.shutdown();
    tracing::info!("Printer task stopped");
}
