use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::time_service::CircuitState;

use super::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncTimeResponse {
    system_time: i64,
    sync_timestamp: i64,
    sync_time: i64,
    sync_time_offset: i64,
    is_degraded: bool,
}

pub async fn sync_time(State(state): State<AppState>) -> Json<Value> {
    let status = state.time.status();
    let system_time = crate::time_service::clock::wall_now_ns();
    let response = SyncTimeResponse {
        system_time,
        sync_timestamp: status.trusted_now_ns,
        sync_time: status.trusted_now_ns,
        sync_time_offset: status.trusted_now_ns - system_time,
        is_degraded: status.circuit_state == CircuitState::Open,
    };
    Json(serde_json::to_value(response).unwrap())
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let status = state.time.status();
    Json(json!({
        "is_initialized": status.initialized,
        "is_degraded": status.circuit_state == CircuitState::Open,
        "last_sync_time": status.trusted_now_ns,
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.time.stats();
    Json(json!({
        "total_syncs": stats.total_sync_attempts.load(std::sync::atomic::Ordering::Relaxed),
        "successful_syncs": stats.total_sync_successes.load(std::sync::atomic::Ordering::Relaxed),
        "failed_syncs": stats.total_sync_failures.load(std::sync::atomic::Ordering::Relaxed),
    }))
}

pub async fn circuit_breaker(State(state): State<AppState>) -> Json<Value> {
    let status = state.time.status();
    Json(json!({
        "is_open": status.circuit_state == CircuitState::Open,
        "failure_count": status.consecutive_failures,
        "last_failure_time": status.last_failure_wall_ns,
        "success_count": state.time.stats().total_sync_successes.load(std::sync::atomic::Ordering::Relaxed),
    }))
}

pub async fn ntp_pool(State(state): State<AppState>) -> Json<Value> {
    let status = state.time.status();
    let selected = status.last_selected_source;
    let entries: Vec<Value> = state
        .time
        .configured_sources()
        .iter()
        .map(|source| {
            let is_selected = selected.as_deref() == Some(source.name.as_str());
            let samples: Vec<Value> = state
                .time
                .last_samples_for(&source.name)
                .iter()
                .map(|sample| {
                    json!({
                        "timestamp": sample.remote_unix_ns,
                        "status": sample.status,
                        "delay": sample.rtt_ns,
                        "offset": sample.deviation_ns,
                    })
                })
                .collect();
            json!({
                "name": source.name,
                "address": source.address,
                "weight": source.weight,
                "is_domestic": source.is_domestic,
                "max_deviation": source.max_deviation_ns,
                "is_active": true,
                "last_sync_time": if is_selected { Some(status.trusted_now_ns) } else { None },
                "is_selected": is_selected,
                "samples": samples,
            })
        })
        .collect();
    Json(json!(entries))
}
