//! Plain HTTP forwarding to one upstream.
//!
//! Each upstream owns one pooled client, so connections are reused per
//! upstream and never shared between upstreams.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Uri, Version};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::{Position, Url};

use crate::http::response;
use crate::proxy::headers::{append_forwarded, join_target, restore_host, strip_hop_by_hop};

/// Pooled client for one upstream; plain HTTP or relaxed HTTPS.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Forwards HTTP requests to a single upstream base URL.
#[derive(Clone)]
pub struct HttpForwarder {
    target: Url,
    client: UpstreamClient,
    timeout: Duration,
    proto: &'static str,
}

impl HttpForwarder {
    pub fn new(
        target: Url,
        tls: rustls::ClientConfig,
        timeout: Duration,
        proto: &'static str,
    ) -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            target,
            client,
            timeout,
            proto,
        }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Absolute URI on the upstream for an incoming request URI.
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
        let origin = &self.target[..Position::BeforePath];
        format!("{}{}", origin, join_target(&self.target, uri)).parse()
    }

    /// Forward a request, streaming the upstream's response back.
    pub async fn forward(&self, mut req: Request<Body>, client: Option<SocketAddr>) -> Response<Body> {
        let original = req.uri().clone();
        restore_host(req.headers_mut(), &original);
        let uri = match self.upstream_uri(req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(upstream = %self.target, error = %e, "Failed to build upstream URI");
                return response::bad_gateway();
            }
        };
        *req.uri_mut() = uri;
        *req.version_mut() = Version::HTTP_11;

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);
        append_forwarded(headers, client, self.proto);

        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(upstream_response)) => {
                let (mut parts, body) = upstream_response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Ok(Err(e)) => {
                tracing::warn!(upstream = %self.target, error = %e, "Upstream request failed");
                response::bad_gateway()
            }
            Err(_) => {
                tracing::warn!(upstream = %self.target, timeout = ?self.timeout, "Upstream request timed out");
                response::gateway_timeout()
            }
        }
    }
}
