use axum::extract::{Path, State};
use axum::{Extension, Json};
use fleetci_core::access::Principal;
use serde::Deserialize;

use crate::error::AppError;
use crate::ops::JobLog;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub repo: String,
    pub run_id: u64,
}

/// POST /api/runs/cancel
pub async fn cancel_run(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CancelBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.cancel_workflow(&principal, &body.repo, body.run_id)
        .await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "repo": body.repo,
        "run_id": body.run_id,
    })))
}

/// GET /api/runs/{repo}/{run_id}/logs: one entry per job.
pub async fn get_logs(
    State(app): State<AppState>,
    Path((repo, run_id)): Path<(String, u64)>,
) -> Result<Json<Vec<JobLog>>, AppError> {
    Ok(Json(app.logs(&repo, run_id).await?))
}
