//! Host matching logic.
//!
//! # Responsibilities
//! - Extract the request host (Host header, else URI authority)
//! - Match exact hosts (case-insensitive, port ignored)
//! - Capture the app label of `{label}.<domain>` hosts
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - App labels are restricted to lowercase ASCII letters
//! - No regex: a suffix compare plus a byte-class check

use axum::body::Body;
use axum::http::{header, Request};

use crate::config::validation::is_valid_subdomain;

/// The host a request was addressed to, lowercased and without port.
pub fn request_host(req: &Request<Body>) -> Option<String> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))?;
    Some(strip_port(raw).to_lowercase())
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches one exact host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }

    /// `host` must already be normalized by [`request_host`].
    pub fn matches(&self, host: &str) -> bool {
        host == self.expected_host
    }
}

/// Matches `{label}.<domain>` where label is `[a-z]+`.
#[derive(Debug, Clone)]
pub struct SubdomainMatcher {
    suffix: String,
}

impl SubdomainMatcher {
    pub fn new(domain: &str) -> Self {
        Self {
            suffix: format!(".{}", domain.to_lowercase()),
        }
    }

    /// The app label, if `host` is a direct child of the domain.
    pub fn capture<'a>(&self, host: &'a str) -> Option<&'a str> {
        host.strip_suffix(&self.suffix)
            .filter(|label| is_valid_subdomain(label))
    }
}
