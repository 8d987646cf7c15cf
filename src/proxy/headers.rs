//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Join upstream base paths with request paths
//! - Spell header names canonically for raw HTTP/1.1 handshakes

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use url::Url;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Headers meaningful only for a single transport-level connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Record the client and original host/scheme for the upstream.
pub fn append_forwarded(headers: &mut HeaderMap, client: Option<SocketAddr>, proto: &str) {
    if let Some(addr) = client {
        let ip = addr.ip().to_string();
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_HOST) {
        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto_value(proto)));
    }
}

fn proto_value(proto: &str) -> &'static str {
    if proto == "https" {
        "https"
    } else {
        "http"
    }
}

/// HTTP/2 clients carry the host in the `:authority` pseudo-header only.
/// Copy it into `Host` before the URI is rewritten to the upstream.
pub fn restore_host(headers: &mut HeaderMap, uri: &Uri) {
    if headers.contains_key(header::HOST) {
        return;
    }
    if let Some(value) = uri
        .authority()
        .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
    {
        headers.insert(header::HOST, value);
    }
}

/// Path and query to request from the upstream: the upstream's base path
/// joined with the request path, and both query strings combined.
pub fn join_target(target: &Url, uri: &Uri) -> String {
    let base = target.path();
    let path = uri.path();
    let mut joined = match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    };

    let query = match (target.query().unwrap_or(""), uri.query().unwrap_or("")) {
        ("", "") => String::new(),
        (q, "") | ("", q) => q.to_string(),
        (a, b) => format!("{a}&{b}"),
    };
    if !query.is_empty() {
        joined.push('?');
        joined.push_str(&query);
    }
    joined
}

/// Whether a request asks to be upgraded to a WebSocket.
pub fn is_websocket_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    connection_upgrade && upgrade_websocket
}

/// Canonical spelling of a header name, e.g. `sec-websocket-key` becomes
/// `Sec-WebSocket-Key`. Some WebSocket servers compare these case-sensitively.
pub fn canonical_header_name(name: &str) -> String {
    let titled = name
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-");
    titled.replace("Websocket", "WebSocket")
}
