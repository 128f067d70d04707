//! HTTP, SSE and WebSocket surface of fleetci, plus the long-lived services
//! behind it: the aggregator, the push broadcaster, the run monitor and the
//! dispatch scheduler.

pub mod aggregator;
pub mod auth;
pub mod error;
pub mod monitor;
pub mod ops;
pub mod realtime;
pub mod routes;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Push (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Reads
        .route("/api/me", get(routes::dashboard::get_me))
        .route("/api/dashboard", get(routes::dashboard::get_dashboard))
        .route(
            "/api/runs/{repo}/{run_id}/logs",
            get(routes::runs::get_logs),
        )
        // Mutations
        .route(
            "/api/workflows/trigger",
            post(routes::workflows::trigger_workflow),
        )
        .route("/api/workflows/bulk", post(routes::workflows::trigger_bulk))
        .route("/api/runs/cancel", post(routes::runs::cancel_run))
        // Schedules
        .route(
            "/api/schedules",
            get(routes::schedules::list_schedules).post(routes::schedules::create_schedule),
        )
        .route(
            "/api/schedules/{id}",
            delete(routes::schedules::cancel_schedule),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::identity_middleware,
        ));

    Router::new()
        .merge(api)
        .route("/ws", get(routes::ws::ws_handler))
        .route("/health", get(routes::dashboard::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the run monitor and serve on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let monitor = app_state.monitor().spawn();
    let app = build_router(app_state);

    tracing::info!("fleetci listening on http://localhost:{actual_port}");

    let result = axum::serve(listener, app).await;
    monitor.abort();
    result?;
    Ok(())
}

/// Bind `0.0.0.0:{port}` and serve.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}
