//! Health check engine.
//!
//! # Responsibilities
//! - Probe every upstream and the served certificate concurrently
//! - Join all probes before publishing one complete snapshot
//! - Serve the last published snapshot to readers without blocking on a
//!   check in progress
//!
//! # Design Decisions
//! - Checks are triggered by health requests, not by a timer
//! - One check at a time (`running`); the snapshot is swapped under a
//!   single write lock so readers never see a partial result
//! - Probe and certificate failures are data in the snapshot, never errors

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::cert::{check_certificate, CertReport};
use crate::config::validation::MAX_CERT_WARNING_HOURS;
use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::upstream::UpstreamTable;

/// Result of probing one upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamStatus {
    /// Status line (`200 OK`) or the transport error text.
    pub response: String,
    pub latency_ms: u64,
    #[serde(skip)]
    status: Option<u16>,
}

impl UpstreamStatus {
    pub fn responded(status: reqwest::StatusCode, latency: Duration) -> Self {
        Self {
            response: status.to_string(),
            latency_ms: latency.as_millis() as u64,
            status: Some(status.as_u16()),
        }
    }

    pub fn failed(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            response: error.into(),
            latency_ms: latency.as_millis() as u64,
            status: None,
        }
    }

    /// Only an exact 200 counts as healthy.
    pub fn is_ok(&self) -> bool {
        self.status == Some(200)
    }
}

#[derive(Serialize)]
struct ReportBody<'a> {
    upstreams: &'a BTreeMap<String, UpstreamStatus>,
    cert: &'a CertReport,
}

/// One complete health check result.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    upstreams: BTreeMap<String, UpstreamStatus>,
    cert: CertReport,
    overall_ok: bool,
    body: Vec<u8>,
    checked_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn new(
        upstreams: BTreeMap<String, UpstreamStatus>,
        cert: CertReport,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let all_ok = upstreams.values().all(UpstreamStatus::is_ok) && cert.ok;
        let (body, overall_ok) = match serde_json::to_vec_pretty(&ReportBody {
            upstreams: &upstreams,
            cert: &cert,
        }) {
            Ok(body) => (body, all_ok),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize health report");
                (b"internal server error".to_vec(), false)
            }
        };

        Self {
            upstreams,
            cert,
            overall_ok,
            body,
            checked_at: Some(checked_at),
        }
    }

    /// Placeholder served until the first check completes.
    pub fn unchecked() -> Self {
        let mut snapshot = Self::new(
            BTreeMap::new(),
            CertReport::failed("health not yet checked"),
            Utc::now(),
        );
        snapshot.checked_at = None;
        snapshot
    }

    pub fn upstreams(&self) -> &BTreeMap<String, UpstreamStatus> {
        &self.upstreams
    }

    pub fn cert(&self) -> &CertReport {
        &self.cert
    }

    pub fn overall_ok(&self) -> bool {
        self.overall_ok
    }

    /// Pretty JSON report, served verbatim.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.checked_at
    }
}

struct Probe {
    name: String,
    url: Option<Url>,
}

pub struct HealthEngine {
    probes: Vec<Probe>,
    cert_path: Option<PathBuf>,
    cert_warning: chrono::Duration,
    client: reqwest::Client,
    running: Mutex<()>,
    published: RwLock<Arc<HealthSnapshot>>,
}

impl HealthEngine {
    pub fn new(config: &GatewayConfig, upstreams: &UpstreamTable) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.health.timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()?;

        let probes = upstreams
            .iter()
            .map(|upstream| Probe {
                name: upstream.name().to_string(),
                url: upstream.health_url().cloned(),
            })
            .collect();

        Ok(Self {
            probes,
            cert_path: config.health_cert_path().map(PathBuf::from),
            cert_warning: cert_warning(config.health.cert_warning_hours),
            client,
            running: Mutex::new(()),
            published: RwLock::new(Arc::new(HealthSnapshot::unchecked())),
        })
    }

    /// Last published snapshot.
    pub async fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.published.read().await.clone()
    }

    /// Run a check, waiting for any check already in progress first.
    pub async fn check(&self) -> Arc<HealthSnapshot> {
        let _running = self.running.lock().await;
        self.run_check().await
    }

    /// Run a check unless one is in progress, in which case return the
    /// last published snapshot immediately.
    pub async fn try_check(&self) -> Arc<HealthSnapshot> {
        match self.running.try_lock() {
            Ok(_running) => self.run_check().await,
            Err(_) => {
                tracing::debug!("Health check already running, serving last snapshot");
                self.snapshot().await
            }
        }
    }

    async fn run_check(&self) -> Arc<HealthSnapshot> {
        let now = Utc::now();

        let cert_path = self.cert_path.clone();
        let warning = self.cert_warning;
        let cert_task =
            tokio::spawn(async move { check_certificate(cert_path.as_deref(), now, warning).await });

        let probe_tasks: Vec<_> = self
            .probes
            .iter()
            .map(|probe| {
                let client = self.client.clone();
                let url = probe.url.clone();
                (probe.name.clone(), tokio::spawn(probe_upstream(client, url)))
            })
            .collect();

        let mut upstreams = BTreeMap::new();
        for (name, task) in probe_tasks {
            let status = task
                .await
                .unwrap_or_else(|e| UpstreamStatus::failed(format!("probe failed: {e}"), Duration::ZERO));
            metrics::record_upstream_health(&name, status.is_ok());
            upstreams.insert(name, status);
        }
        let cert = cert_task
            .await
            .unwrap_or_else(|e| CertReport::failed(format!("certificate check failed: {e}")));
        metrics::record_cert(cert.ok);

        let snapshot = Arc::new(HealthSnapshot::new(upstreams, cert, now));
        *self.published.write().await = snapshot.clone();

        tracing::info!(
            ok = snapshot.overall_ok(),
            upstreams = snapshot.upstreams().len(),
            "Health check complete"
        );
        snapshot
    }
}

fn cert_warning(hours: u64) -> chrono::Duration {
    let hours = hours.min(MAX_CERT_WARNING_HOURS) as i64;
    chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
}

async fn probe_upstream(client: reqwest::Client, url: Option<Url>) -> UpstreamStatus {
    let Some(url) = url else {
        return UpstreamStatus::failed("no health check URL configured", Duration::ZERO);
    };
    let start = Instant::now();
    match client.get(url.clone()).send().await {
        Ok(response) => UpstreamStatus::responded(response.status(), start.elapsed()),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Health probe failed");
            UpstreamStatus::failed(error_chain(&e), start.elapsed())
        }
    }
}

/// An error's message followed by each of its causes, `": "`-joined.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamSpec;
    use chrono::TimeZone;

    fn report(ok: bool) -> CertReport {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let not_before = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let not_after = if ok {
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
        } else {
            Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap()
        };
        CertReport::from_validity(not_before, not_after, now, chrono::Duration::hours(72))
    }

    fn statuses(codes: &[(&str, u16)]) -> BTreeMap<String, UpstreamStatus> {
        codes
            .iter()
            .map(|(name, code)| {
                let status = reqwest::StatusCode::from_u16(*code).unwrap();
                (name.to_string(), UpstreamStatus::responded(status, Duration::from_millis(3)))
            })
            .collect()
    }

    #[test]
    fn overall_ok_requires_every_200_and_good_cert() {
        let now = Utc::now();
        assert!(HealthSnapshot::new(statuses(&[("a", 200), ("b", 200)]), report(true), now).overall_ok());
        assert!(!HealthSnapshot::new(statuses(&[("a", 200), ("b", 204)]), report(true), now).overall_ok());
        assert!(!HealthSnapshot::new(statuses(&[("a", 200)]), report(false), now).overall_ok());

        let mut down = statuses(&[("a", 200)]);
        down.insert("b".into(), UpstreamStatus::failed("connection refused", Duration::ZERO));
        assert!(!HealthSnapshot::new(down, report(true), now).overall_ok());
    }

    #[test]
    fn body_matches_report_shape() {
        let snapshot = HealthSnapshot::new(statuses(&[("app", 200)]), report(true), Utc::now());
        let json: serde_json::Value = serde_json::from_slice(snapshot.body()).unwrap();
        assert_eq!(json["upstreams"]["app"]["response"], "200 OK");
        assert_eq!(json["upstreams"]["app"]["latency_ms"], 3);
        assert_eq!(json["cert"]["ok"], true);
        assert!(json["cert"]["expires_at"].is_string());
        assert!(json["upstreams"]["app"].get("status").is_none());
    }

    #[test]
    fn cert_warning_is_clamped() {
        assert_eq!(cert_warning(72), chrono::Duration::hours(72));
        assert_eq!(
            cert_warning(u64::MAX),
            chrono::Duration::hours(MAX_CERT_WARNING_HOURS as i64)
        );
    }

    #[test]
    fn error_chain_includes_causes() {
        #[derive(Debug, thiserror::Error)]
        #[error("error sending request")]
        struct Outer(#[source] std::io::Error);

        let e = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(error_chain(&e), "error sending request: connection refused");
    }

    #[test]
    fn unchecked_snapshot_is_unhealthy() {
        let snapshot = HealthSnapshot::unchecked();
        assert!(!snapshot.overall_ok());
        assert!(snapshot.checked_at().is_none());
        assert_eq!(snapshot.cert().error.as_deref(), Some("health not yet checked"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_recorded_as_data() {
        let mut config = GatewayConfig {
            domain: "example.com".into(),
            ..Default::default()
        };
        config.upstreams.insert(
            "down".into(),
            UpstreamSpec {
                url: Some("http://127.0.0.1:1".into()),
                ..Default::default()
            },
        );
        config.upstreams.insert(
            "sock".into(),
            UpstreamSpec {
                websocket: Some("ws://127.0.0.1:1".into()),
                ..Default::default()
            },
        );
        let table = UpstreamTable::from_config(&config).unwrap();
        let engine = HealthEngine::new(&config, &table).unwrap();

        assert!(!engine.snapshot().await.overall_ok());
        let snapshot = engine.check().await;
        assert!(!snapshot.overall_ok());
        assert!(!snapshot.upstreams()["down"].is_ok());
        let down = snapshot.upstreams()["down"].response.to_lowercase();
        assert!(down.contains("127.0.0.1:1"), "{down}");
        assert!(down.contains("refused"), "{down}");
        assert_eq!(
            snapshot.upstreams()["sock"].response,
            "no health check URL configured"
        );
        assert_eq!(snapshot.cert().error.as_deref(), Some("no certificate configured"));
        assert!(Arc::ptr_eq(&snapshot, &engine.snapshot().await));
    }
}
