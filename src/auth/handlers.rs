//! Handlers on the `oauth.<domain>` host.
//!
//! - `GET /authorized`: provider callback; establishes the session
//! - `GET /session`: debug dump of the caller's session values
//! - `GET /logout`: expires the session cookie

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::session::{REDIRECT_KEY, STATE_KEY, USER_KEY};

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/authorized", get(authorized))
        .route("/session", get(session_values))
        .route("/logout", get(logout))
        .fallback(|| async { response::not_found() })
        .with_state(state)
}

pub async fn authorized(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let mut session = state.sessions.load(&headers);

    let expected = session.remove(STATE_KEY);
    if expected.is_none() || params.state != expected {
        tracing::warn!("OAuth callback with missing or mismatched state");
        metrics::record_login("bad_state");
        return response::forbidden();
    }

    let Some(code) = params.code else {
        if let Some(error) = &params.error {
            tracing::info!(error = %error, "Identity provider returned an error");
        }
        metrics::record_login("missing_code");
        return response::bad_request("missing code\n");
    };

    let identity = match state.authorizer.exchange(&code).await {
        Ok(identity) => identity,
        Err(e) => {
            if e.is_denial() {
                tracing::warn!(error = %e, "Login denied");
                metrics::record_login("denied");
            } else {
                tracing::error!(error = %e, "Login failed");
                metrics::record_login("error");
            }
            // Keep the consumed state out of the cookie.
            let mut res = response::forbidden();
            if let Ok(cookie) = state.sessions.save(&session) {
                res.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            return res;
        }
    };

    session.insert(USER_KEY, identity.name());
    session.renew();
    let target = session
        .remove(REDIRECT_KEY)
        .unwrap_or_else(|| state.config.default_redirect());

    let cookie = match state.sessions.save(&session) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!(error = %e, "Failed to save session");
            metrics::record_login("error");
            return response::internal_error();
        }
    };

    tracing::info!(user = %identity.name(), redirect = %target, "Login succeeded");
    metrics::record_login("success");
    response::found(&target, Some(cookie))
}

pub async fn session_values(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.sessions.load(&headers);
    Json(session.values().clone()).into_response()
}

pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie: HeaderValue = state.sessions.clear();
    ([(header::SET_COOKIE, cookie)], "logged out\n").into_response()
}
