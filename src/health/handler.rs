//! Handlers on the `health.<domain>` host.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use super::engine::HealthSnapshot;
use crate::http::response;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check", get(check))
        .fallback(|| async { response::not_found() })
        .with_state(state)
}

/// `GET /check`: run a check (or reuse the one in flight) and report it.
pub async fn check(State(state): State<AppState>) -> Response {
    let snapshot = state.health.try_check().await;
    snapshot_response(&snapshot)
}

pub fn snapshot_response(snapshot: &HealthSnapshot) -> Response {
    let status = if snapshot.overall_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        [(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
        snapshot.body().to_vec(),
    )
        .into_response()
}
