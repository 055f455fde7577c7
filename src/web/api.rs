//! Defines the Axum API routes and handlers.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;

use crate::web::models::{
    AsyncStopResponse, ErrorResponse, GcodeCommandRequest, GcodeResponse, PumpStopRequest,
    StatusResponse, StopResponse,
};
use crate::web::printer_channel::PrinterRequest;

pub type AppState = Sender<PrinterRequest>;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(printer_tx: AppState) -> Router {
    Router::new()
        .route("/api/v1/enose/status", get(get_status))
        .route("/api/v1/enose/pump_stop", post(pump_stop))
        .route("/api/v1/enose/fast_stop", post(fast_stop))
        .route("/api/v1/enose/async_stop", post(async_stop))
        .route("/api/v1/gcode", post(execute_gcode))
        .with_state(printer_tx)
}

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn printer_gone() -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "printer task is not running")
}

/// Send a request to the printer task and wait for its answer.
async fn ask<T>(
    printer_tx: &AppState,
    request: impl FnOnce(oneshot::Sender<T>) -> PrinterRequest,
) -> Result<T, ApiError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    if printer_tx.send(request(resp_tx)).await.is_err() {
        return Err(printer_gone());
    }
    // A queued command whose reactor slot was refused drops its responder.
    resp_rx
        .await
        .map_err(|_| api_error(StatusCode::SERVICE_UNAVAILABLE, "request was dropped"))
}

/// An empty body means "no explicit pumps".
fn parse_pumps(body: &Bytes) -> Result<Vec<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice::<PumpStopRequest>(body)
        .map(|req| req.pumps)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)))
}

/// Handler to get the current pump status.
async fn get_status(State(printer_tx): State<AppState>) -> ApiResult<StatusResponse> {
    let status = ask(&printer_tx, |respond_to| PrinterRequest::GetStatus { respond_to }).await?;
    Ok(Json(status))
}

async fn pump_stop(State(printer_tx): State<AppState>, body: Bytes) -> ApiResult<StopResponse> {
    let pumps = parse_pumps(&body)?;
    let result = ask(&printer_tx, |respond_to| PrinterRequest::PumpStop { pumps, respond_to }).await?;
    result
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))
}

async fn fast_stop(State(printer_tx): State<AppState>) -> ApiResult<StopResponse> {
    let result = ask(&printer_tx, |respond_to| PrinterRequest::FastStop { respond_to }).await?;
    result
        .map(Json)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))
}

async fn async_stop(State(printer_tx): State<AppState>, body: Bytes) -> ApiResult<AsyncStopResponse> {
    let pumps = parse_pumps(&body)?;
    let result = ask(&printer_tx, |respond_to| PrinterRequest::AsyncStop { pumps, respond_to }).await?;
    result
        .map(|request_id| Json(AsyncStopResponse { scheduled: true, request_id }))
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, format!("not scheduled: {}", e)))
}

/// Handler to execute a single operator command.
async fn execute_gcode(
    State(printer_tx): State<AppState>,
    Json(payload): Json<GcodeCommandRequest>,
) -> ApiResult<GcodeResponse> {
    let command = payload.command;
    let result = ask(&printer_tx, |respond_to| PrinterRequest::ExecuteGcode { command, respond_to }).await?;
    result
        .map(|response| Json(GcodeResponse { response }))
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}
