//! API route definitions.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::events::{ingest, RawRecord};
use crate::pipeline::{self, AnalysisReport};
use crate::storage;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(ingest_events))
        .route("/cases", get(list_cases))
        .route("/anomalies", get(anomalies))
        .route("/bottlenecks", get(bottlenecks))
        .route("/temporal", get(temporal))
        .route("/failures", get(failures))
        .route("/report", get(report))
}

fn base_meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": base_meta()
    }))
}

/// Append a batch of raw events, then re-run the analysis over the whole log.
async fn ingest_events(
    State(state): State<AppState>,
    Json(records): Json<Vec<RawRecord>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if records.is_empty() {
        return Err(ApiError::EmptyBatch);
    }
    let events = ingest::from_records(records)?;

    let _guard = state.ingest_lock.lock().await;
    let pool = state.pool.clone();
    let config = state.config.clone();
    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<Value> {
        let accepted = storage::save_events(&pool, &events)?;
        let log = storage::load_events(&pool)?;
        let report = pipeline::analyze(&log, &config);
        storage::save_report(&pool, &report)?;
        Ok(json!({
            "accepted": accepted,
            "run_id": report.run_id,
            "total_events": report.event_count,
            "cases": report.reconstruction.cases.len(),
            "anomalies": report.anomalies.anomalous,
            "failures": report.failures.total_failures,
        }))
    })
    .await??;

    info!(accepted = %summary["accepted"], run_id = %summary["run_id"], "event batch analyzed");
    Ok((StatusCode::CREATED, Json(json!({ "data": summary, "meta": base_meta() }))))
}

async fn list_cases(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let pool = state.pool.clone();
    let cases = tokio::task::spawn_blocking(move || storage::latest_cases(&pool)).await??;
    Ok(Json(json!({
        "data": cases,
        "meta": { "total": cases.len(), "timestamp": chrono::Utc::now().to_rfc3339() }
    })))
}

/// Serve one section of the latest stored report.
async fn latest_section<T, F>(state: &AppState, section: F) -> ApiResult<Json<Value>>
where
    T: Serialize,
    F: FnOnce(AnalysisReport) -> T,
{
    let pool = state.pool.clone();
    let latest = tokio::task::spawn_blocking(move || storage::latest_report(&pool)).await??;
    let Some(report) = latest else {
        return Ok(Json(json!({ "data": null, "meta": { "message": "no analysis runs yet" } })));
    };
    let meta = json!({
        "run_id": report.run_id,
        "generated_at": report.generated_at.to_rfc3339(),
        "event_count": report.event_count,
    });
    Ok(Json(json!({ "data": section(report), "meta": meta })))
}

async fn anomalies(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    latest_section(&state, |r| r.anomalies).await
}

async fn bottlenecks(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    latest_section(&state, |r| r.bottlenecks).await
}

async fn temporal(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    latest_section(&state, |r| r.temporal).await
}

async fn failures(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    latest_section(&state, |r| r.failures).await
}

async fn report(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    latest_section(&state, |r| r).await
}
