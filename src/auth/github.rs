//! GitHub organization membership.
//!
//! A user is allowed in when they belong to the configured organization.
//! Requires the `read:org` scope so private memberships are visible.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{redirect_uri, AuthError, Authorizer, Identity};
use crate::config::GithubConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GitHub's largest page size for list endpoints.
const ORGS_PER_PAGE: u32 = 100;

/// Upper bound on followed `/user/orgs` pages.
const MAX_ORG_PAGES: usize = 20;

/// Provider URLs. Overridable for tests.
#[derive(Debug, Clone)]
pub struct GithubEndpoints {
    pub authorize: String,
    pub token: String,
    pub api: String,
}

impl Default for GithubEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://github.com/login/oauth/authorize".to_string(),
            token: "https://github.com/login/oauth/access_token".to_string(),
            api: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Org {
    id: u64,
}

pub struct GithubAuth {
    client_id: String,
    client_secret: String,
    org_id: u64,
    redirect_uri: String,
    endpoints: GithubEndpoints,
    http: reqwest::Client,
}

impl GithubAuth {
    pub fn new(config: &GithubConfig, domain: &str) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            org_id: config.authorized_org_id,
            redirect_uri: redirect_uri(domain),
            endpoints: GithubEndpoints::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GithubEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn access_token(&self, code: &str) -> Result<String, AuthError> {
        let token: TokenResponse = self
            .http
            .post(&self.endpoints.token)
            .timeout(REQUEST_TIMEOUT)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match token {
            TokenResponse {
                access_token: Some(token),
                ..
            } => Ok(token),
            TokenResponse {
                error,
                error_description,
                ..
            } => Err(AuthError::Provider(
                error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )),
        }
    }

    async fn api_get(&self, url: &str, token: &str) -> Result<reqwest::Response, AuthError> {
        let response = self
            .http
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "subgate")
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, AuthError> {
        let url = format!("{}{}", self.endpoints.api, path);
        Ok(self.api_get(&url, token).await?.json().await?)
    }

    /// Walk `/user/orgs` page by page until the org shows up or the
    /// `Link` header has no next page.
    async fn is_member(&self, token: &str) -> Result<bool, AuthError> {
        let mut next = Some(format!(
            "{}/user/orgs?per_page={ORGS_PER_PAGE}",
            self.endpoints.api
        ));
        let mut pages = 0;
        while let Some(url) = next.take() {
            if pages == MAX_ORG_PAGES {
                tracing::warn!(pages, "Stopped following GitHub org pages");
                break;
            }
            pages += 1;

            let response = self.api_get(&url, token).await?;
            next = next_page(response.headers());
            let orgs: Vec<Org> = response.json().await?;
            if orgs.iter().any(|org| org.id == self.org_id) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Authorizer for GithubAuth {
    fn authorization_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", "read:org")
            .append_pair("state", state)
            .finish();
        format!("{}?{}", self.endpoints.authorize, query)
    }

    async fn exchange(&self, code: &str) -> Result<Identity, AuthError> {
        let token = self.access_token(code).await?;
        let user: User = self.get("/user", &token).await?;

        if self.is_member(&token).await? {
            Ok(Identity::new(user.login))
        } else {
            Err(AuthError::Denied(user.login))
        }
    }
}

/// Target of the `rel="next"` entry in a GitHub `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"");
        is_next.then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}
