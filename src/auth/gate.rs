//! Session gate for app subdomains.
//!
//! Runs before the dispatcher. Apps with `auth = true`, and any app name
//! without an upstream, need a logged-in session. Anonymous callers are sent
//! to the identity provider with the original URL remembered in the session.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use crate::http::request::RequestIdExt;
use crate::http::response;
use crate::http::server::AppState;
use crate::routing::matcher::request_host;
use crate::routing::AppName;
use crate::session::{REDIRECT_KEY, STATE_KEY};

pub async fn require_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let app = match req.extensions().get::<AppName>() {
        Some(AppName(app)) => app.clone(),
        None => return response::not_found(),
    };
    if !state.upstreams.requires_auth(&app) {
        return next.run(req).await;
    }

    let mut session = state.sessions.load(req.headers());
    if session.is_authenticated() {
        return next.run(req).await;
    }

    let oauth_state = new_oauth_state();
    session.insert(REDIRECT_KEY, original_url(&req));
    session.insert(STATE_KEY, oauth_state.clone());
    let cookie = match state.sessions.save(&session) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!(request_id = %req.request_id(), error = %e, "Failed to save session");
            return response::internal_error();
        }
    };

    tracing::debug!(
        request_id = %req.request_id(),
        app = %app,
        "Unauthenticated request, redirecting to identity provider"
    );
    response::found(&state.authorizer.authorization_url(&oauth_state), Some(cookie))
}

/// Absolute URL the client asked for.
fn original_url(req: &Request<Body>) -> String {
    let host = request_host(req).unwrap_or_default();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("https://{host}{path}")
}

fn new_oauth_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
