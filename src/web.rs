//! HTTP API over the engine.
//!
//! Thin request/response glue: every handler locks the shared engine, calls
//! one core operation, and renders the result.  Validation failures come back
//! as 400s with no core state touched.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::{now_epoch_ms, round1, SharedEngine, StageInfo, Status};
use crate::stage::Stage;

type ApiError = (StatusCode, Json<Value>);

fn bad_request(e: anyhow::Error) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": format!("{e:#}") })),
    )
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/stage", get(get_stage))
        .route("/api/stage/manual", post(set_manual_stage))
        .route("/api/stage/auto", post(clear_manual_stage))
        .route("/api/stages", get(list_stages))
        .route("/api/stages/update", post(update_stage))
        .route("/api/interval", get(get_interval).post(set_interval))
        .route("/api/pump", post(pump_control))
        .route("/api/measure", post(measure))
        .route("/api/history", get(history).delete(clear_history))
        .with_state(engine)
}

// ---------------------------------------------------------------------------
// Status and stage
// ---------------------------------------------------------------------------

async fn status(State(engine): State<SharedEngine>) -> Json<Status> {
    let engine = engine.lock().await;
    Json(engine.status(now_epoch_ms(), Instant::now()))
}

async fn get_stage(State(engine): State<SharedEngine>) -> Json<StageInfo> {
    let engine = engine.lock().await;
    Json(engine.stage_info(now_epoch_ms()))
}

#[derive(Deserialize)]
struct ManualStageBody {
    index: i64,
}

async fn set_manual_stage(
    State(engine): State<SharedEngine>,
    Json(body): Json<ManualStageBody>,
) -> Result<Json<StageInfo>, ApiError> {
    let mut engine = engine.lock().await;
    engine.set_manual_stage(body.index).map_err(bad_request)?;
    Ok(Json(engine.stage_info(now_epoch_ms())))
}

async fn clear_manual_stage(State(engine): State<SharedEngine>) -> Json<StageInfo> {
    let mut engine = engine.lock().await;
    engine.clear_manual_stage();
    Json(engine.stage_info(now_epoch_ms()))
}

async fn list_stages(State(engine): State<SharedEngine>) -> Json<Vec<Stage>> {
    let engine = engine.lock().await;
    Json(engine.stages().to_vec())
}

#[derive(Deserialize)]
struct UpdateStageBody {
    index: i64,
    humidity_threshold: Option<i64>,
    watering_time_sec: Option<i64>,
}

async fn update_stage(
    State(engine): State<SharedEngine>,
    Json(body): Json<UpdateStageBody>,
) -> Result<Json<Vec<Stage>>, ApiError> {
    let mut engine = engine.lock().await;
    engine
        .update_stage_params(body.index, body.humidity_threshold, body.watering_time_sec)
        .map_err(bad_request)?;
    Ok(Json(engine.stages().to_vec()))
}

// ---------------------------------------------------------------------------
// Measurement interval
// ---------------------------------------------------------------------------

async fn get_interval(State(engine): State<SharedEngine>) -> Json<Value> {
    let engine = engine.lock().await;
    Json(json!({ "hours": engine.interval_hours() }))
}

#[derive(Deserialize)]
struct IntervalBody {
    hours: i64,
}

async fn set_interval(
    State(engine): State<SharedEngine>,
    Json(body): Json<IntervalBody>,
) -> Result<Json<Value>, ApiError> {
    let mut engine = engine.lock().await;
    engine.set_interval(body.hours).map_err(bad_request)?;
    Ok(Json(json!({ "status": "success", "hours": engine.interval_hours() })))
}

// ---------------------------------------------------------------------------
// Pump control and on-demand cycles
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PumpBody {
    action: String,
    duration_sec: Option<i64>,
}

async fn pump_control(
    State(engine): State<SharedEngine>,
    Json(body): Json<PumpBody>,
) -> Result<Json<Value>, ApiError> {
    let mut engine = engine.lock().await;
    match body.action.as_str() {
        "on" => {
            let duration = body.duration_sec.ok_or_else(|| {
                bad_request(anyhow::anyhow!("missing 'duration_sec' for action 'on'"))
            })?;
            engine.pump_on(Instant::now(), duration).map_err(bad_request)?;
            Ok(Json(json!({
                "status": "success",
                "pump": "on",
                "duration_sec": duration,
            })))
        }
        "off" => {
            engine.pump_off();
            Ok(Json(json!({ "status": "success", "pump": "off" })))
        }
        other => Err(bad_request(anyhow::anyhow!(
            "invalid action '{other}', use 'on' or 'off'"
        ))),
    }
}

async fn measure(State(engine): State<SharedEngine>) -> Json<Status> {
    let mut engine = engine.lock().await;
    engine.run_cycle(now_epoch_ms(), Instant::now()).await;
    Json(engine.status(now_epoch_ms(), Instant::now()))
}

// ---------------------------------------------------------------------------
// Measurement history
// ---------------------------------------------------------------------------

/// One history record as rendered to callers: quantities at one decimal
/// place, explicit nulls when the reading was invalid.
#[derive(Serialize)]
struct RecordDto {
    epoch_ms: i64,
    temperature: Option<f32>,
    humidity: Option<f32>,
    #[serde(rename = "pumpActivated")]
    pump_activated: bool,
    stage: String,
}

async fn history(State(engine): State<SharedEngine>) -> Json<Vec<RecordDto>> {
    let engine = engine.lock().await;
    Json(
        engine
            .history()
            .map(|r| RecordDto {
                epoch_ms: r.epoch_ms,
                temperature: r.temperature.map(round1),
                humidity: r.humidity.map(round1),
                pump_activated: r.pump_activated,
                stage: r.stage.clone(),
            })
            .collect(),
    )
}

async fn clear_history(State(engine): State<SharedEngine>) -> Json<Value> {
    let mut engine = engine.lock().await;
    engine.clear_history();
    Json(json!({ "status": "success" }))
}

// ===========================================================================
// Tests
// ===========================================================================
