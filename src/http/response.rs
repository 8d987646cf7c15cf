//! Gateway-generated responses.
//!
//! Upstream responses are streamed through untouched; these cover the
//! cases where the gateway itself answers.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

fn plain(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "404 page not found\n")
}

pub fn bad_request(body: &'static str) -> Response {
    plain(StatusCode::BAD_REQUEST, body)
}

pub fn forbidden() -> Response {
    plain(StatusCode::FORBIDDEN, "forbidden\n")
}

pub fn internal_error() -> Response {
    plain(StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n")
}

pub fn bad_gateway() -> Response {
    plain(StatusCode::BAD_GATEWAY, "bad gateway\n")
}

pub fn gateway_timeout() -> Response {
    plain(StatusCode::GATEWAY_TIMEOUT, "gateway timeout\n")
}

/// 302 to `location`, optionally setting a cookie.
pub fn found(location: &str, cookie: Option<header::HeaderValue>) -> Response {
    let mut res = StatusCode::FOUND.into_response();
    match header::HeaderValue::from_str(location) {
        Ok(value) => {
            res.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => return internal_error(),
    }
    if let Some(cookie) = cookie {
        res.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    res
}
