use axum::extract::{Query, State};
use axum::{Extension, Json};
use fleetci_core::access::Principal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ops::Dashboard;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub team: Option<String>,
    pub branch: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// GET /api/dashboard?team=&branch=: runs, filtered, with metrics.
pub async fn get_dashboard(
    State(app): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, AppError> {
    let dashboard = app
        .dashboard(non_empty(&query.team), non_empty(&query.branch))
        .await?;
    Ok(Json(dashboard))
}

#[derive(Debug, Serialize)]
pub struct Me {
    #[serde(flatten)]
    pub principal: Principal,
    /// Whether a push stream is currently registered for this identity.
    pub push_connected: bool,
}

/// GET /api/me: the authenticated caller.
pub async fn get_me(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Json<Me> {
    let push_connected = app.broadcaster.is_connected(&principal.identity);
    Json(Me {
        principal,
        push_connected,
    })
}

/// GET /health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "workflows": app.config.workflows.len(),
        "connections": app.broadcaster.connection_count(),
        "scheduled": app.scheduler.len(),
    }))
}
