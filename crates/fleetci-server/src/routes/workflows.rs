use axum::extract::State;
use axum::{Extension, Json};
use fleetci_core::access::Principal;

use crate::error::AppError;
use crate::ops::{BulkItem, BulkRequest, TriggerRequest};
use crate::state::AppState;

/// POST /api/workflows/trigger: dispatch one configured workflow.
pub async fn trigger_workflow(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<TriggerRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let git_ref = body.git_ref.clone();
    let wf = app.trigger_workflow(&principal, body).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "workflow": wf,
        "ref": git_ref,
    })))
}

/// POST /api/workflows/bulk: dispatch the build of several apps of a team.
pub async fn trigger_bulk(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<Vec<BulkItem>>, AppError> {
    let results = app.trigger_bulk(&principal, body).await?;
    Ok(Json(results))
}
