//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Cookie header
//!     → SessionStore::load (unseal, check age; failure ⇒ empty session)
//!     → Session (read by auth gate, login callback, header templates)
//!     → SessionStore::save (seal) → Set-Cookie
//! ```
//!
//! # Design Decisions
//! - Sessions live entirely client-side; the store only holds the sealing key
//! - A session that cannot be decoded is treated as absent, never as an error
//! - The store is a trait so the gate and dispatcher never see the cipher

pub mod cookie;

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

pub use cookie::CookieStore;

/// Authenticated identity.
pub const USER_KEY: &str = "user";
/// Absolute URL to return to once login completes.
pub const REDIRECT_KEY: &str = "redirect";
/// OAuth `state` issued with the authorization redirect.
pub const STATE_KEY: &str = "state";

/// Client-side session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    values: BTreeMap<String, String>,
    /// Unix seconds when this session was (re)established. Zero until saved.
    issued_at: i64,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// The logged-in identity, if any.
    pub fn user(&self) -> Option<&str> {
        self.get(USER_KEY).filter(|user| !user.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Restart the session lifetime, e.g. after a successful login.
    pub fn renew(&mut self) {
        self.issued_at = chrono::Utc::now().timestamp();
    }
}

/// Error type for session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to seal session")]
    Seal,
    #[error("sealed session is not a valid header value")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
}

/// Loads and persists sessions.
///
/// Implementations must be safe to share across every request handler.
pub trait SessionStore: Send + Sync {
    /// Name of the session cookie.
    fn cookie_name(&self) -> &str;

    /// Read the session carried by a request. Never fails.
    fn load(&self, headers: &HeaderMap) -> Session;

    /// Produce the `Set-Cookie` value persisting `session`.
    fn save(&self, session: &Session) -> Result<HeaderValue, SessionError>;

    /// Produce a `Set-Cookie` value that deletes the session.
    fn clear(&self) -> HeaderValue;
}
