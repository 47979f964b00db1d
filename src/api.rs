use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::refresh::scheduler::{Scheduler, TriggerOutcome};
use crate::refresh::types::{Snapshot, SourceKind};

#[derive(Clone)]
pub struct AppState {
    scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

/// Read-only view of the snapshot store plus a manual refresh hook.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshots", get(list_snapshots))
        .route("/snapshots/{source}", get(get_snapshot))
        .route("/admin/refresh/{source}", post(admin_refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn parse_source(raw: &str) -> Result<SourceKind, (StatusCode, String)> {
    raw.parse::<SourceKind>()
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

async fn list_snapshots(State(state): State<AppState>) -> Json<Vec<Snapshot>> {
    let out = state
        .scheduler
        .store()
        .snapshots()
        .into_iter()
        .map(|s| (*s).clone())
        .collect();
    Json(out)
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Snapshot>, (StatusCode, String)> {
    let source = parse_source(&raw)?;
    let snap = state.scheduler.store().get(source);
    Ok(Json((*snap).clone()))
}

async fn admin_refresh(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> (StatusCode, String) {
    let source = match parse_source(&raw) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match state.scheduler.trigger(source) {
        TriggerOutcome::Started(_) => (StatusCode::ACCEPTED, "started".to_string()),
        TriggerOutcome::Skipped => (StatusCode::CONFLICT, "in flight".to_string()),
        TriggerOutcome::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped".to_string()),
        TriggerOutcome::Unknown => (
            StatusCode::NOT_FOUND,
            format!("source '{source}' is not scheduled"),
        ),
    }
}
