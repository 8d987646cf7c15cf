//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Returns every problem found,
//! not just the first, so an operator can fix a config file in one pass.

use axum::http::HeaderName;
use url::Url;

use crate::config::schema::{GatewayConfig, UpstreamSpec};
use crate::routing::RESERVED_LABELS;
use crate::upstream::template::HeaderTemplate;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("upstream '{0}': name must be one or more lowercase letters")]
    InvalidUpstreamName(String),

    #[error("upstream '{name}': invalid {field} '{url}': {reason}")]
    InvalidUrl {
        name: String,
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("upstream '{0}': name is reserved for the gateway's own endpoints")]
    ReservedUpstreamName(String),

    #[error("health: cert_warning_hours must be at most {max}, got {got}")]
    CertWarningTooLarge { got: u64, max: u64 },

    #[error("upstream '{0}': needs a url or a websocket target")]
    NoTarget(String),

    #[error("upstream '{name}': invalid header name '{header}'")]
    InvalidHeaderName { name: String, header: String },

    #[error("upstream '{name}': header '{header}': {reason}")]
    InvalidTemplate {
        name: String,
        header: String,
        reason: String,
    },

    #[error("google: invalid email_regex: {0}")]
    InvalidEmailRegex(String),

    #[error("must define an authorizer; please configure either google or github authorization")]
    NoAuthorizer,

    #[error("can only use one authorizer; please configure either google or github authorization")]
    MultipleAuthorizers,
}

/// Ten years; keeps certificate arithmetic far from chrono's limits.
pub const MAX_CERT_WARNING_HOURS: u64 = 24 * 365 * 10;

pub(crate) const HTTP_SCHEMES: &[&str] = &["http", "https"];
pub(crate) const WS_SCHEMES: &[&str] = &["ws", "wss", "http", "https"];

/// Parse an upstream URL, requiring a host and one of `schemes`.
pub(crate) fn parse_target(raw: &str, schemes: &[&str]) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url)
}

/// Whether `label` is usable as an app subdomain.
pub fn is_valid_subdomain(label: &str) -> bool {
    !label.is_empty() && label.bytes().all(|b| b.is_ascii_lowercase())
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.domain.trim().is_empty() {
        errors.push(ValidationError::EmptyDomain);
    }

    for (name, spec) in &config.upstreams {
        validate_upstream(name, spec, &mut errors);
    }

    if config.health.cert_warning_hours > MAX_CERT_WARNING_HOURS {
        errors.push(ValidationError::CertWarningTooLarge {
            got: config.health.cert_warning_hours,
            max: MAX_CERT_WARNING_HOURS,
        });
    }

    match (&config.github, &config.google) {
        (None, None) => errors.push(ValidationError::NoAuthorizer),
        (Some(_), Some(_)) => errors.push(ValidationError::MultipleAuthorizers),
        _ => {}
    }

    if let Some(google) = &config.google {
        if let Err(e) = regex::Regex::new(&google.email_regex) {
            errors.push(ValidationError::InvalidEmailRegex(e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream(name: &str, spec: &UpstreamSpec, errors: &mut Vec<ValidationError>) {
    if !is_valid_subdomain(name) {
        errors.push(ValidationError::InvalidUpstreamName(name.to_string()));
    } else if RESERVED_LABELS.contains(&name) {
        errors.push(ValidationError::ReservedUpstreamName(name.to_string()));
    }

    if spec.url.is_none() && spec.websocket.is_none() {
        errors.push(ValidationError::NoTarget(name.to_string()));
    }

    let targets = [
        ("url", spec.url.as_deref(), HTTP_SCHEMES),
        ("websocket", spec.websocket.as_deref(), WS_SCHEMES),
        ("health_check", spec.health_check.as_deref(), HTTP_SCHEMES),
    ];
    for (field, raw, schemes) in targets {
        let Some(raw) = raw else { continue };
        if let Err(reason) = parse_target(raw, schemes) {
            errors.push(ValidationError::InvalidUrl {
                name: name.to_string(),
                field,
                url: raw.to_string(),
                reason,
            });
        }
    }

    for (header, templates) in &spec.headers {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName {
                name: name.to_string(),
                header: header.clone(),
            });
        }
        for source in templates {
            if let Err(e) = HeaderTemplate::parse(source) {
                errors.push(ValidationError::InvalidTemplate {
                    name: name.to_string(),
                    header: header.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{GithubConfig, GoogleConfig};

    fn github() -> GithubConfig {
        GithubConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            authorized_org_id: 1,
        }
    }

    fn google(regex: &str) -> GoogleConfig {
        GoogleConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            email_regex: regex.into(),
        }
    }

    fn base() -> GatewayConfig {
        let mut config = GatewayConfig {
            domain: "example.com".into(),
            github: Some(github()),
            ..Default::default()
        };
        config.upstreams.insert(
            "app".into(),
            UpstreamSpec {
                url: Some("http://127.0.0.1:9001".into()),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&base()).is_ok());
    }

    #[test]
    fn rejects_missing_authorizer() {
        let mut config = base();
        config.github = None;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::NoAuthorizer]
        );
    }

    #[test]
    fn rejects_two_authorizers() {
        let mut config = base();
        config.google = Some(google(".*"));
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MultipleAuthorizers]
        );
    }

    #[test]
    fn rejects_bad_email_regex() {
        let mut config = base();
        config.github = None;
        config.google = Some(google("(unclosed"));
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidEmailRegex(_)));
    }

    #[test]
    fn collects_every_upstream_problem() {
        let mut config = base();
        config.domain = " ".into();
        config.upstreams.insert(
            "Bad1".into(),
            UpstreamSpec {
                url: Some("ftp://host/".into()),
                websocket: Some("not a url".into()),
                ..Default::default()
            },
        );
        config.upstreams.insert("empty".into(), UpstreamSpec::default());

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyDomain));
        assert!(errors.contains(&ValidationError::InvalidUpstreamName("Bad1".into())));
        assert!(errors.contains(&ValidationError::NoTarget("empty".into())));
        let bad_urls = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::InvalidUrl { .. }))
            .count();
        assert_eq!(bad_urls, 2);
    }

    #[test]
    fn rejects_bad_headers_and_templates() {
        let mut config = base();
        let app = config.upstreams.get_mut("app").unwrap();
        app.headers
            .insert("X-User".into(), vec!["{{ session.user".into()]);
        app.headers.insert("Bad Header".into(), vec!["x".into()]);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InvalidTemplate { header, .. } if header == "X-User"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::InvalidHeaderName { header, .. } if header == "Bad Header"
        )));
    }

    #[test]
    fn rejects_reserved_upstream_names() {
        let mut config = base();
        for name in ["oauth", "health"] {
            config.upstreams.insert(
                name.into(),
                UpstreamSpec {
                    url: Some("http://127.0.0.1:9001".into()),
                    ..Default::default()
                },
            );
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ReservedUpstreamName("health".into()),
                ValidationError::ReservedUpstreamName("oauth".into()),
            ]
        );
    }

    #[test]
    fn bounds_cert_warning_window() {
        let mut config = base();
        config.health.cert_warning_hours = MAX_CERT_WARNING_HOURS;
        assert!(validate_config(&config).is_ok());

        config.health.cert_warning_hours = u64::MAX;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::CertWarningTooLarge {
                got: u64::MAX,
                max: MAX_CERT_WARNING_HOURS,
            }]
        );
    }

    #[test]
    fn subdomain_labels() {
        assert!(is_valid_subdomain("app"));
        assert!(!is_valid_subdomain(""));
        assert!(!is_valid_subdomain("app2"));
        assert!(!is_valid_subdomain("my-app"));
        assert!(!is_valid_subdomain("App"));
    }
}
