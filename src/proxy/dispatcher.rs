//! Request dispatch for app subdomains.
//!
//! Runs after the auth gate. Resolves the app to its upstream, rewrites
//! templated headers from the session, and hands the request to the
//! WebSocket or HTTP forwarder.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::Response;

use crate::http::request::RequestIdExt;
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::proxy::headers::is_websocket_request;
use crate::routing::AppName;

/// Forward a request to the upstream named by its `AppName`.
pub async fn dispatch(State(state): State<AppState>, mut req: Request<Body>) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let Some(AppName(app)) = req.extensions().get::<AppName>().cloned() else {
        return response::not_found();
    };
    let Some(upstream) = state.upstreams.get(&app).cloned() else {
        tracing::debug!(app = %app, "No upstream for app");
        metrics::record_unknown_app(&method, start);
        return response::not_found();
    };

    if upstream.has_header_templates() {
        let session = state.sessions.load(req.headers());
        if let Err(e) = upstream.apply_headers(req.headers_mut(), &session) {
            tracing::error!(
                request_id = %req.request_id(),
                upstream = %app,
                error = %e,
                "Header template rendering failed"
            );
            metrics::record_request(&app, &method, 500, start);
            return response::internal_error();
        }
    }

    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::debug!(
        request_id = %req.request_id(),
        upstream = %app,
        method = %method,
        path = %req.uri().path(),
        "Proxying request"
    );

    let res = match (is_websocket_request(req.headers()), upstream.websocket(), upstream.http()) {
        (true, Some(ws), _) => ws.forward(req, client).await,
        (_, _, Some(http)) => http.forward(req, client).await,
        _ => response::not_found(),
    };

    metrics::record_request(&app, &method, res.status().as_u16(), start);
    res
}
