//! Host-based dispatch.
//!
//! # Responsibilities
//! - Decide which subsystem owns a request from its Host alone
//! - Hand the app label to the proxy subsystem
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - `oauth` and `health` labels are reserved and checked first
//! - Explicit NotFound rather than a silent default

use axum::body::Body;
use axum::http::Request;

use crate::routing::matcher::{request_host, HostMatcher, SubdomainMatcher};

pub const LOGIN_LABEL: &str = "oauth";
pub const HEALTH_LABEL: &str = "health";

/// Labels owned by the gateway itself; never app names.
pub const RESERVED_LABELS: &[&str] = &[LOGIN_LABEL, HEALTH_LABEL];

/// Which subsystem a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `oauth.<domain>`: login callback and session endpoints.
    Login,
    /// `health.<domain>`: health checks.
    Health,
    /// `{label}.<domain>`: a proxied app.
    App(String),
    /// Anything else.
    NotFound,
}

/// App label attached to requests routed to the proxy subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppName(pub String);

/// Maps request hosts to subsystems.
#[derive(Debug, Clone)]
pub struct HostRouter {
    login: HostMatcher,
    health: HostMatcher,
    apps: SubdomainMatcher,
}

impl HostRouter {
    pub fn new(domain: &str) -> Self {
        Self {
            login: HostMatcher::new(format!("{LOGIN_LABEL}.{domain}")),
            health: HostMatcher::new(format!("{HEALTH_LABEL}.{domain}")),
            apps: SubdomainMatcher::new(domain),
        }
    }

    pub fn route(&self, req: &Request<Body>) -> Destination {
        match request_host(req) {
            Some(host) => self.route_host(&host),
            None => Destination::NotFound,
        }
    }

    /// `host` must be lowercase and without port.
    pub fn route_host(&self, host: &str) -> Destination {
        if self.login.matches(host) {
            Destination::Login
        } else if self.health.matches(host) {
            Destination::Health
        } else if let Some(label) = self.apps.capture(host) {
            Destination::App(label.to_string())
        } else {
            Destination::NotFound
        }
    }
}
