//! Certificate validity checks.
//!
//! Reads the served certificate (first PEM block) and classifies it against
//! the current time and the expiry warning window.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("failed to read certificate: {0}")]
    Io(#[from] std::io::Error),
    #[error("no certificate found")]
    Empty,
    #[error("failed to parse certificate: {0}")]
    Parse(String),
    #[error("certificate validity out of range")]
    Range,
}

/// Where `now` falls relative to a certificate's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Ok,
    NotYetValid,
    ExpiresSoon,
    Expired,
}

impl CertStatus {
    fn error(self) -> Option<&'static str> {
        match self {
            CertStatus::Ok => None,
            CertStatus::NotYetValid => Some("not yet valid"),
            CertStatus::ExpiresSoon => Some("expires soon"),
            CertStatus::Expired => Some("expired"),
        }
    }
}

/// Classify `now` against `[not_before, not_after)` with a warning window
/// before `not_after`.
pub fn classify(
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    now: DateTime<Utc>,
    warning: Duration,
) -> CertStatus {
    if now < not_before {
        CertStatus::NotYetValid
    } else if now >= not_after {
        CertStatus::Expired
    } else if not_after
        .checked_sub_signed(warning)
        .map_or(true, |warn_from| now >= warn_from)
    {
        CertStatus::ExpiresSoon
    } else {
        CertStatus::Ok
    }
}

/// Certificate section of the health report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
}

impl CertReport {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            expires_at: None,
            error: Some(error.into()),
            expires_in: None,
            valid_at: None,
        }
    }

    pub fn from_validity(
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        now: DateTime<Utc>,
        warning: Duration,
    ) -> Self {
        let status = classify(not_before, not_after, now, warning);
        let mut report = Self {
            ok: status == CertStatus::Ok,
            expires_at: Some(not_after),
            error: status.error().map(str::to_string),
            expires_in: None,
            valid_at: None,
        };
        match status {
            CertStatus::ExpiresSoon => {
                report.expires_in = Some(format_duration(not_after - now));
            }
            CertStatus::NotYetValid => {
                report.valid_at = Some(not_before);
            }
            CertStatus::Ok | CertStatus::Expired => {}
        }
        report
    }
}

/// `(not_before, not_after)` of the first certificate in a PEM bundle.
pub fn validity(pem: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>), CertError> {
    let der = rustls_pemfile::certs(&mut &pem[..])
        .next()
        .ok_or(CertError::Empty)??;
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| CertError::Parse(e.to_string()))?;
    let validity = cert.validity();

    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0).ok_or(CertError::Range)?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0).ok_or(CertError::Range)?;
    Ok((not_before, not_after))
}

/// Read and classify the certificate at `path`. Failures become report data.
pub async fn check_certificate(
    path: Option<&Path>,
    now: DateTime<Utc>,
    warning: Duration,
) -> CertReport {
    let Some(path) = path else {
        return CertReport::failed("no certificate configured");
    };
    let pem = match tokio::fs::read(path).await {
        Ok(pem) => pem,
        Err(e) => return CertReport::failed(CertError::Io(e).to_string()),
    };
    match validity(&pem) {
        Ok((not_before, not_after)) => CertReport::from_validity(not_before, not_after, now, warning),
        Err(e) => CertReport::failed(e.to_string()),
    }
}

/// Compact duration, e.g. `71h59m58s`, `4m0s`, `9s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{sign}{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{sign}{m}m{s}s")
    } else {
        format!("{sign}{s}s")
    }
}
