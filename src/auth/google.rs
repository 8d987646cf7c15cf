//! Google verified email.
//!
//! A user is allowed in when Google reports their email as verified and it
//! matches the configured regex.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;

use super::{redirect_uri, AuthError, Authorizer, Identity};
use crate::config::{GoogleConfig, ValidationError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider URLs. Overridable for tests.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub authorize: String,
    pub token: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Google has sent `email_verified` both as a boolean and as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdClaims {
    #[serde(default)]
    email: String,
    email_verified: Option<Flag>,
}

impl IdClaims {
    fn verified(&self) -> bool {
        self.email_verified.as_ref().is_some_and(Flag::is_set)
    }
}

/// Claims from an ID token's payload. The signature is not checked: the
/// token was received directly from Google over TLS.
fn decode_id_token(token: &str) -> Result<IdClaims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidToken("not a JWS".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidToken(e.to_string()))
}

pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    email_regex: Regex,
    redirect_uri: String,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
}

impl GoogleAuth {
    pub fn new(config: &GoogleConfig, domain: &str) -> Result<Self, ValidationError> {
        let email_regex = Regex::new(&config.email_regex)
            .map_err(|e| ValidationError::InvalidEmailRegex(e.to_string()))?;
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            email_regex,
            redirect_uri: redirect_uri(domain),
            endpoints: GoogleEndpoints::default(),
            http: reqwest::Client::new(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn authorize(&self, claims: IdClaims) -> Result<Identity, AuthError> {
        if !claims.verified() {
            return Err(AuthError::Unverified);
        }
        if !self.email_regex.is_match(&claims.email) {
            return Err(AuthError::Denied(claims.email));
        }
        Ok(Identity::new(claims.email))
    }
}

#[async_trait]
impl Authorizer for GoogleAuth {
    fn authorization_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email")
            .append_pair("state", state)
            .finish();
        format!("{}?{}", self.endpoints.authorize, query)
    }

    async fn exchange(&self, code: &str) -> Result<Identity, AuthError> {
        let token: TokenResponse = self
            .http
            .post(&self.endpoints.token)
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let id_token = match token {
            TokenResponse {
                id_token: Some(id_token),
                ..
            } => id_token,
            TokenResponse {
                error,
                error_description,
                ..
            } => {
                return Err(AuthError::Provider(
                    error_description
                        .or(error)
                        .unwrap_or_else(|| "no id_token in response".to_string()),
                ))
            }
        };

        self.authorize(decode_id_token(&id_token)?)
    }
}
