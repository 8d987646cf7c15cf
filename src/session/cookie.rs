//! Sealed cookie session store.
//!
//! Session values are serialized to JSON and sealed with AES-256-GCM under
//! a key generated at process start, so every restart invalidates all
//! outstanding sessions.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;

use super::{Session, SessionError, SessionStore};

const NONCE_LEN: usize = 12;

/// Cookie-backed [`SessionStore`].
#[derive(Clone)]
pub struct CookieStore {
    cipher: Aes256Gcm,
    name: String,
    domain: String,
    max_age_secs: u64,
}

impl CookieStore {
    /// Create a store with a random key and a random `_s<n>` cookie name.
    pub fn new(domain: impl Into<String>, max_age_secs: u64) -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
            name: random_session_name(),
            domain: domain.into(),
            max_age_secs,
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, SessionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| SessionError::Seal)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    fn open(&self, encoded: &str) -> Option<Vec<u8>> {
        let combined = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        if combined.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()
    }

    fn cookie_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value)
    }

    fn expired(&self, session: &Session) -> bool {
        let now = chrono::Utc::now().timestamp();
        session.issued_at <= 0 || now - session.issued_at >= self.max_age_secs as i64
    }
}

impl SessionStore for CookieStore {
    fn cookie_name(&self) -> &str {
        &self.name
    }

    fn load(&self, headers: &HeaderMap) -> Session {
        let Some(sealed) = self.cookie_value(headers) else {
            return Session::default();
        };

        let session = self
            .open(sealed)
            .and_then(|plaintext| serde_json::from_slice::<Session>(&plaintext).ok());

        match session {
            Some(session) if !self.expired(&session) => session,
            Some(_) => {
                tracing::debug!("Discarding expired session");
                Session::default()
            }
            None => {
                tracing::debug!("Discarding undecodable session cookie");
                Session::default()
            }
        }
    }

    fn save(&self, session: &Session) -> Result<HeaderValue, SessionError> {
        let mut session = session.clone();
        if session.issued_at <= 0 {
            session.renew();
        }

        let plaintext = serde_json::to_vec(&session)?;
        let sealed = self.seal(&plaintext)?;
        let cookie = format!(
            "{}={}; Domain={}; Path=/; Max-Age={}; HttpOnly; Secure",
            self.name, sealed, self.domain, self.max_age_secs
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }

    fn clear(&self) -> HeaderValue {
        let cookie = format!(
            "{}=; Domain={}; Path=/; Max-Age=0; HttpOnly; Secure",
            self.name, self.domain
        );
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

fn random_session_name() -> String {
    let n: i64 = rand::thread_rng().gen_range(0..i64::MAX);
    format!("_s{n}")
}
