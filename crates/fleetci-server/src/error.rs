use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleetci_core::error::FleetError;
use gh_actions::GatewayError;

// ---------------------------------------------------------------------------
// ServiceError: what the operations in `ops` return
// ---------------------------------------------------------------------------

/// Failure of a dashboard operation: either a local rule (auth, input,
/// lookup) or the remote platform.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ServiceError {
    pub fn as_fleet(&self) -> Option<&FleetError> {
        match self {
            ServiceError::Fleet(e) => Some(e),
            ServiceError::Gateway(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

fn fleet_status(e: &FleetError) -> StatusCode {
    match e {
        FleetError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        FleetError::NotTeamMember { .. } | FleetError::RoleNotPermitted { .. } => {
            StatusCode::FORBIDDEN
        }
        FleetError::TeamNotFound(_)
        | FleetError::WorkflowNotFound(_)
        | FleetError::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
        FleetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FleetError::Config(_)
        | FleetError::Io(_)
        | FleetError::Yaml(_)
        | FleetError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn gateway_status(e: &GatewayError) -> StatusCode {
    if e.is_rate_limited() {
        StatusCode::TOO_MANY_REQUESTS
    } else if matches!(e, GatewayError::Timeout(_)) {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

fn fleet_body(e: &FleetError) -> serde_json::Value {
    match e {
        FleetError::RoleNotPermitted { required, .. } => serde_json::json!({
            "error": e.to_string(),
            "required": required,
        }),
        _ => serde_json::json!({ "error": e.to_string() }),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let fleet = self
            .0
            .downcast_ref::<ServiceError>()
            .and_then(ServiceError::as_fleet)
            .or_else(|| self.0.downcast_ref::<FleetError>());
        if let Some(e) = fleet {
            return (fleet_status(e), axum::Json(fleet_body(e))).into_response();
        }

        let gateway = match self.0.downcast_ref::<ServiceError>() {
            Some(ServiceError::Gateway(g)) => Some(g),
            _ => self.0.downcast_ref::<GatewayError>(),
        };
        if let Some(e) = gateway {
            let body = serde_json::json!({
                "error": e.to_string(),
                "transient": e.is_transient(),
            });
            return (gateway_status(e), axum::Json(body)).into_response();
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
