//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Parent domain; apps live at `<name>.<domain>`.
    pub domain: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Optional inbound TLS.
    pub tls: Option<TlsConfig>,

    /// Upstream definitions keyed by subdomain label.
    pub upstreams: BTreeMap<String, UpstreamSpec>,

    /// GitHub organization membership authorizer.
    pub github: Option<GithubConfig>,

    /// Google verified-email authorizer.
    pub google: Option<GoogleConfig>,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Health check settings.
    pub health: HealthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Certificate checked by the health engine.
    pub fn health_cert_path(&self) -> Option<&str> {
        self.health
            .cert_path
            .as_deref()
            .or(self.tls.as_ref().map(|tls| tls.cert_path.as_str()))
    }

    /// Where a completed login lands when no return URL was recorded.
    pub fn default_redirect(&self) -> String {
        self.session
            .default_redirect
            .clone()
            .unwrap_or_else(|| format!("https://{}/", self.domain))
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// A single proxied backend, reachable at `<name>.<domain>`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamSpec {
    /// HTTP target (e.g., "http://127.0.0.1:9001").
    pub url: Option<String>,

    /// WebSocket target (e.g., "ws://127.0.0.1:9001").
    pub websocket: Option<String>,

    /// Whether a logged-in session is required.
    pub auth: bool,

    /// Health probe URL, defaults to `url`.
    pub health_check: Option<String>,

    /// Header name to ordered list of templates.
    pub headers: BTreeMap<String, Vec<String>>,
}

/// GitHub OAuth application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Numeric id of the organization whose members are allowed in.
    pub authorized_org_id: u64,
}

/// Google OAuth client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Matched against verified email addresses. Keep it simple.
    pub email_regex: String,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie lifetime in seconds.
    pub max_age_secs: u64,

    /// Landing page after login when no return URL was recorded.
    pub default_redirect: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            default_redirect: None,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Certificates expiring within this many hours are reported unhealthy.
    pub cert_warning_hours: u64,

    /// Certificate to check. Falls back to `tls.cert_path`.
    pub cert_path: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            cert_warning_hours: 72,
            cert_path: None,
        }
    }
}

/// Timeout configuration for proxied requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for a proxied HTTP request/response head, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
