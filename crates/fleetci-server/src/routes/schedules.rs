use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use fleetci_core::access::Principal;
use fleetci_core::types::ScheduledDispatch;

use crate::error::AppError;
use crate::ops::ScheduleTriggerRequest;
use crate::state::AppState;

/// POST /api/schedules: returns 201 with the new entry's id and fire time.
pub async fn create_schedule(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ScheduleTriggerRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let scheduled = app.schedule_trigger(&principal, body)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": scheduled.id,
            "fire_at": scheduled.fire_at,
        })),
    ))
}

/// GET /api/schedules
pub async fn list_schedules(State(app): State<AppState>) -> Json<Vec<ScheduledDispatch>> {
    Json(app.list_scheduled())
}

/// DELETE /api/schedules/{id}
pub async fn cancel_schedule(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cancelled = app.cancel_scheduled(&principal, &id)?;
    Ok(Json(serde_json::json!({ "ok": true, "id": cancelled.id })))
}
