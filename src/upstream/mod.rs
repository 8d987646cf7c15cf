//! Upstream table.
//!
//! # Responsibilities
//! - Compile each configured upstream into its runtime form once, at startup
//! - Own one HTTP connection pool and one WebSocket connector per upstream
//! - Answer "does this app require login?" for the auth gate
//!
//! # Design Decisions
//! - Immutable after construction; shared read-only across all handlers
//! - Unknown apps require login, so an anonymous caller cannot tell a
//!   missing app from a protected one

pub mod template;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use url::Url;

use crate::config::validation::{parse_target, HTTP_SCHEMES, WS_SCHEMES};
use crate::config::{GatewayConfig, UpstreamSpec};
use crate::proxy::http::HttpForwarder;
use crate::proxy::tls::relaxed_client_config;
use crate::proxy::websocket::WsForwarder;
use crate::session::Session;
use template::{HeaderTemplate, TemplateError};

/// Error type for building the upstream table.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream '{name}': invalid {field}: {reason}")]
    InvalidUrl {
        name: String,
        field: &'static str,
        reason: String,
    },
    #[error("upstream '{name}': invalid header name '{header}'")]
    InvalidHeaderName { name: String, header: String },
    #[error("upstream '{name}': header '{header}': {source}")]
    Template {
        name: String,
        header: String,
        source: TemplateError,
    },
    #[error("upstream TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// A configured upstream, ready to serve traffic.
pub struct Upstream {
    name: String,
    requires_auth: bool,
    http: Option<HttpForwarder>,
    websocket: Option<WsForwarder>,
    health_url: Option<Url>,
    headers: Vec<(HeaderName, Vec<HeaderTemplate>)>,
}

impl Upstream {
    fn build(
        name: &str,
        spec: &UpstreamSpec,
        tls: &rustls::ClientConfig,
        timeout: Duration,
        proto: &'static str,
    ) -> Result<Self, UpstreamError> {
        let target = |field: &'static str, raw: &Option<String>, schemes: &[&str]| {
            raw.as_deref()
                .map(|raw| parse_target(raw, schemes))
                .transpose()
                .map_err(|reason| UpstreamError::InvalidUrl {
                    name: name.to_string(),
                    field,
                    reason,
                })
        };

        let http = target("url", &spec.url, HTTP_SCHEMES)?
            .map(|url| HttpForwarder::new(url, tls.clone(), timeout, proto));
        let websocket = target("websocket", &spec.websocket, WS_SCHEMES)?
            .map(|url| WsForwarder::new(url, tls.clone(), timeout, proto));
        let health_url = match &spec.health_check {
            Some(_) => target("health_check", &spec.health_check, HTTP_SCHEMES)?,
            None => http.as_ref().map(|h| h.target().clone()),
        };

        let mut headers = Vec::with_capacity(spec.headers.len());
        for (header, sources) in &spec.headers {
            let header_name = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
                UpstreamError::InvalidHeaderName {
                    name: name.to_string(),
                    header: header.clone(),
                }
            })?;
            let templates = sources
                .iter()
                .map(|source| HeaderTemplate::parse(source))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| UpstreamError::Template {
                    name: name.to_string(),
                    header: header.clone(),
                    source,
                })?;
            headers.push((header_name, templates));
        }

        Ok(Self {
            name: name.to_string(),
            requires_auth: spec.auth,
            http,
            websocket,
            health_url,
            headers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn http(&self) -> Option<&HttpForwarder> {
        self.http.as_ref()
    }

    pub fn websocket(&self) -> Option<&WsForwarder> {
        self.websocket.as_ref()
    }

    /// URL probed by the health engine.
    pub fn health_url(&self) -> Option<&Url> {
        self.health_url.as_ref()
    }

    pub fn has_header_templates(&self) -> bool {
        !self.headers.is_empty()
    }

    /// Replace every templated header with values rendered from `session`.
    /// Client-supplied values for those headers are always discarded.
    pub fn apply_headers(
        &self,
        headers: &mut HeaderMap,
        session: &Session,
    ) -> Result<(), TemplateError> {
        for (name, _) in &self.headers {
            headers.remove(name);
        }
        for (name, templates) in &self.headers {
            for template in templates {
                headers.append(name.clone(), template.render(session)?);
            }
        }
        Ok(())
    }
}

/// All upstreams, keyed by app label.
#[derive(Default)]
pub struct UpstreamTable {
    upstreams: HashMap<String, Arc<Upstream>>,
}

impl UpstreamTable {
    /// Build every upstream. Any invalid upstream fails the whole table.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, UpstreamError> {
        let tls = relaxed_client_config()?;
        let timeout = Duration::from_secs(config.timeouts.request_secs);
        let proto = if config.tls.is_some() { "https" } else { "http" };

        let mut upstreams = HashMap::with_capacity(config.upstreams.len());
        for (name, spec) in &config.upstreams {
            let upstream = Upstream::build(name, spec, &tls, timeout, proto)?;
            tracing::debug!(
                upstream = %name,
                auth = upstream.requires_auth,
                http = upstream.http.is_some(),
                websocket = upstream.websocket.is_some(),
                "Upstream configured"
            );
            upstreams.insert(name.clone(), Arc::new(upstream));
        }
        Ok(Self { upstreams })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Upstream>> {
        self.upstreams.get(name)
    }

    /// Unknown apps require login.
    pub fn requires_auth(&self, name: &str) -> bool {
        self.get(name).map_or(true, |u| u.requires_auth())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Upstream>> {
        self.upstreams.values()
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::USER_KEY;
    use axum::http::HeaderValue;

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig {
            domain: "example.com".into(),
            ..Default::default()
        };
        let mut app = UpstreamSpec {
            url: Some("http://127.0.0.1:9001".into()),
            auth: true,
            ..Default::default()
        };
        app.headers.insert(
            "X-User".into(),
            vec!["{{ session.user }}".into(), "gateway".into()],
        );
        config.upstreams.insert("app".into(), app);
        config.upstreams.insert(
            "chat".into(),
            UpstreamSpec {
                websocket: Some("ws://127.0.0.1:9002".into()),
                health_check: Some("http://127.0.0.1:9002/healthz".into()),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn builds_table() {
        let table = UpstreamTable::from_config(&config()).unwrap();
        assert_eq!(table.len(), 2);

        let app = table.get("app").unwrap();
        assert!(app.requires_auth());
        assert!(app.http().is_some());
        assert!(app.websocket().is_none());
        assert_eq!(app.health_url().unwrap().as_str(), "http://127.0.0.1:9001/");

        let chat = table.get("chat").unwrap();
        assert!(!chat.requires_auth());
        assert!(chat.http().is_none());
        assert_eq!(chat.health_url().unwrap().path(), "/healthz");
    }

    #[test]
    fn unknown_apps_require_auth() {
        let table = UpstreamTable::from_config(&config()).unwrap();
        assert!(table.requires_auth("app"));
        assert!(!table.requires_auth("chat"));
        assert!(table.requires_auth("nope"));
    }

    #[test]
    fn templated_headers_replace_client_values() {
        let table = UpstreamTable::from_config(&config()).unwrap();
        let app = table.get("app").unwrap();

        let mut headers = HeaderMap::new();
        headers.append("x-user", HeaderValue::from_static("spoofed-admin"));
        headers.append("x-user", HeaderValue::from_static("spoofed-again"));
        headers.insert("accept", HeaderValue::from_static("text/html"));

        let mut session = Session::default();
        session.insert(USER_KEY, "alice");
        app.apply_headers(&mut headers, &session).unwrap();

        let values: Vec<_> = headers.get_all("x-user").iter().collect();
        assert_eq!(values, vec!["alice", "gateway"]);
        assert_eq!(headers["accept"], "text/html");
    }

    #[test]
    fn bad_template_fails_build() {
        let mut config = config();
        config
            .upstreams
            .get_mut("app")
            .unwrap()
            .headers
            .insert("X-Bad".into(), vec!["{{ nope }}".into()]);
        assert!(matches!(
            UpstreamTable::from_config(&config),
            Err(UpstreamError::Template { .. })
        ));
    }
}
