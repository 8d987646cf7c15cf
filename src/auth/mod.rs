//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Request on a protected app
//!     → gate.rs (session check; redirect to provider with state)
//!     → identity provider consent screen
//!     → handlers.rs /authorized (state check, code exchange)
//!     → github.rs | google.rs (token, identity, policy)
//!     → session cookie set, redirect back to the original URL
//! ```
//!
//! # Design Decisions
//! - Exactly one provider per deployment, chosen from config with an
//!   exhaustive match
//! - Policy (org membership, verified email) is enforced inside `exchange`,
//!   so an `Identity` always means "allowed in"

pub mod gate;
pub mod github;
pub mod google;
pub mod handlers;

use async_trait::async_trait;

use crate::config::{GatewayConfig, ValidationError};
pub use gate::require_login;
pub use github::GithubAuth;
pub use google::GoogleAuth;

/// An authenticated and authorized user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// GitHub login or Google email.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Why a login attempt did not produce an identity.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider rejected the exchange: {0}")]
    Provider(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("identity is not verified")]
    Unverified,

    #[error("{0} is not authorized")]
    Denied(String),
}

impl AuthError {
    /// Whether the user was identified but refused by policy.
    pub fn is_denial(&self) -> bool {
        matches!(self, AuthError::Unverified | AuthError::Denied(_))
    }
}

/// An OAuth identity provider.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Consent URL carrying `state`, which must come back on the callback.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for a verified, allowed identity.
    async fn exchange(&self, code: &str) -> Result<Identity, AuthError>;
}

/// Callback URL registered with the provider.
pub fn redirect_uri(domain: &str) -> String {
    format!("https://oauth.{domain}/authorized")
}

/// The configured identity provider.
pub enum Provider {
    Github(GithubAuth),
    Google(GoogleAuth),
}

impl Provider {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ValidationError> {
        match (&config.github, &config.google) {
            (Some(github), None) => Ok(Provider::Github(GithubAuth::new(github, &config.domain))),
            (None, Some(google)) => GoogleAuth::new(google, &config.domain).map(Provider::Google),
            (None, None) => Err(ValidationError::NoAuthorizer),
            (Some(_), Some(_)) => Err(ValidationError::MultipleAuthorizers),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Github(_) => "github",
            Provider::Google(_) => "google",
        }
    }
}

#[async_trait]
impl Authorizer for Provider {
    fn authorization_url(&self, state: &str) -> String {
        match self {
            Provider::Github(p) => p.authorization_url(state),
            Provider::Google(p) => p.authorization_url(state),
        }
    }

    async fn exchange(&self, code: &str) -> Result<Identity, AuthError> {
        match self {
            Provider::Github(p) => p.exchange(code).await,
            Provider::Google(p) => p.exchange(code).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GithubConfig, GoogleConfig};

    fn config() -> GatewayConfig {
        GatewayConfig {
            domain: "example.com".into(),
            ..Default::default()
        }
    }

    fn github() -> GithubConfig {
        GithubConfig {
            client_id: "gh-id".into(),
            client_secret: "gh-secret".into(),
            authorized_org_id: 42,
        }
    }

    fn google() -> GoogleConfig {
        GoogleConfig {
            client_id: "g-id".into(),
            client_secret: "g-secret".into(),
            email_regex: r"@example\.com$".into(),
        }
    }

    #[test]
    fn selects_the_configured_provider() {
        let mut c = config();
        c.github = Some(github());
        assert_eq!(Provider::from_config(&c).ok().map(|p| p.name()), Some("github"));

        let mut c = config();
        c.google = Some(google());
        assert_eq!(Provider::from_config(&c).ok().map(|p| p.name()), Some("google"));
    }

    #[test]
    fn requires_exactly_one_provider() {
        assert!(matches!(
            Provider::from_config(&config()),
            Err(ValidationError::NoAuthorizer)
        ));

        let mut c = config();
        c.github = Some(github());
        c.google = Some(google());
        assert!(matches!(
            Provider::from_config(&c),
            Err(ValidationError::MultipleAuthorizers)
        ));
    }

    #[test]
    fn callback_lives_on_the_oauth_host() {
        assert_eq!(redirect_uri("example.com"), "https://oauth.example.com/authorized");
    }
}
