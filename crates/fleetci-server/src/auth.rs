use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppError;
use crate::state::AppState;

pub const IDENTITY_HEADER: &str = "x-fleetci-identity";
pub const IDENTITY_COOKIE: &str = "fleetci_identity";

/// Axum middleware that resolves the caller to a
/// [`Principal`](fleetci_core::access::Principal) and stores it in the
/// request extensions.
///
/// The identity comes from the `x-fleetci-identity` header, else from the
/// `fleetci_identity` cookie. No identity, or one the registry does not
/// know, is answered with 401 JSON before the handler runs.
pub async fn identity_middleware(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(identity) = identity_from(req.headers()) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing identity" })),
        )
            .into_response();
    };

    match app.access.authenticate(&identity) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(identity = %identity, "rejected unknown identity");
            AppError::from(e).into_response()
        }
    }
}

pub fn identity_from(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(IDENTITY_HEADER).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    let cookies = headers.get("cookie").and_then(|v| v.to_str().ok())?;
    cookies.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(IDENTITY_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
