//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Replay the client's upgrade handshake to the upstream over a fresh
//!   connection, with canonically spelled header names
//! - Relay the upstream's handshake response to the client
//! - Once both sides have switched protocols, copy bytes in both directions
//!
//! # Data Flow
//! ```text
//! Client ←──── upgraded connection ────→ Gateway ←──── TCP / TLS ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - Byte-level tunnel: frames, pings and close are never inspected
//! - The handshake is written by hand because HTTP libraries lowercase
//!   header names, and some upstreams compare `Sec-WebSocket-*` exactly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::http::response;
use crate::proxy::headers::{append_forwarded, canonical_header_name, join_target, restore_host};

/// Upper bound on the upstream's handshake response head.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("connect: {0}")]
    Connect(#[from] std::io::Error),
    #[error("invalid upstream host")]
    InvalidHost,
    #[error("upstream closed the connection during the handshake")]
    Closed,
    #[error("upstream handshake response too large")]
    TooLarge,
    #[error("malformed upstream handshake response")]
    Malformed,
    #[error("upstream handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// Parsed head of the upstream's handshake response.
struct ResponseHead {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    /// Bytes read past the end of the head.
    leftover: Vec<u8>,
}

/// Tunnels WebSocket connections to a single upstream.
#[derive(Clone)]
pub struct WsForwarder {
    target: Url,
    tls: TlsConnector,
    timeout: Duration,
    proto: &'static str,
}

impl WsForwarder {
    pub fn new(
        target: Url,
        tls: rustls::ClientConfig,
        timeout: Duration,
        proto: &'static str,
    ) -> Self {
        Self {
            target,
            tls: TlsConnector::from(Arc::new(tls)),
            timeout,
            proto,
        }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    fn is_secure(&self) -> bool {
        matches!(self.target.scheme(), "wss" | "https")
    }

    async fn connect(&self) -> Result<Box<dyn Io>, HandshakeError> {
        let host = self.target.host_str().ok_or(HandshakeError::InvalidHost)?;
        let port = self
            .target
            .port()
            .unwrap_or(if self.is_secure() { 443 } else { 80 });
        let stream = TcpStream::connect((host, port)).await?;

        if !self.is_secure() {
            return Ok(Box::new(stream));
        }
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|_| HandshakeError::InvalidHost)?;
        let stream = self.tls.connect(server_name, stream).await?;
        Ok(Box::new(stream))
    }

    /// The raw HTTP/1.1 upgrade request sent to the upstream.
    fn handshake_request(&self, req: &Request<Body>, client: Option<SocketAddr>) -> Vec<u8> {
        let mut headers = req.headers().clone();
        restore_host(&mut headers, req.uri());
        append_forwarded(&mut headers, client, self.proto);

        let mut raw = format!(
            "{} {} HTTP/1.1\r\n",
            req.method(),
            join_target(&self.target, req.uri())
        )
        .into_bytes();
        for (name, value) in &headers {
            raw.extend_from_slice(canonical_header_name(name.as_str()).as_bytes());
            raw.extend_from_slice(b": ");
            raw.extend_from_slice(value.as_bytes());
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        raw
    }

    /// Connect, send `raw` and read the response head, all bounded by the
    /// request timeout.
    async fn handshake(&self, raw: Vec<u8>) -> Result<(Box<dyn Io>, ResponseHead), HandshakeError> {
        let exchange = async {
            let mut upstream = self.connect().await?;
            upstream.write_all(&raw).await?;
            let head = read_response_head(&mut upstream).await?;
            Ok::<_, HandshakeError>((upstream, head))
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HandshakeError::Timeout(self.timeout))?
    }

    /// Forward an upgrade request and, if the upstream accepts, tunnel the
    /// connection in a background task.
    pub async fn forward(&self, mut req: Request<Body>, client: Option<SocketAddr>) -> Response<Body> {
        // Request<Body> is !Sync, so no borrow of `req` may live across an await.
        let raw = self.handshake_request(&req, client);
        let (mut upstream, head) = match self.handshake(raw).await {
            Ok(result) => result,
            Err(e @ HandshakeError::Timeout(_)) => {
                tracing::warn!(upstream = %self.target, error = %e, "WebSocket handshake with upstream timed out");
                return response::gateway_timeout();
            }
            Err(e) => {
                tracing::warn!(upstream = %self.target, error = %e, "WebSocket handshake with upstream failed");
                return response::bad_gateway();
            }
        };

        let mut builder = Response::builder().status(head.status);
        for (name, value) in &head.headers {
            if name == "content-length" || name == "transfer-encoding" {
                continue;
            }
            builder = builder.header(name, value);
        }

        if head.status != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(upstream = %self.target, status = %head.status, "Upstream refused WebSocket upgrade");
            return builder
                .body(Body::from(head.leftover))
                .unwrap_or_else(|_| response::bad_gateway());
        }

        let on_upgrade = hyper::upgrade::on(&mut req);
        let target = self.target.clone();
        let leftover = head.leftover;
        tokio::spawn(async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::warn!(upstream = %target, error = %e, "Client upgrade failed");
                    return;
                }
            };
            let mut client_io = TokioIo::new(upgraded);
            if !leftover.is_empty() {
                if let Err(e) = client_io.write_all(&leftover).await {
                    tracing::debug!(upstream = %target, error = %e, "WebSocket closed early");
                    return;
                }
            }
            match tokio::io::copy_bidirectional(&mut client_io, &mut upstream).await {
                Ok((to_upstream, to_client)) => {
                    tracing::debug!(upstream = %target, to_upstream, to_client, "WebSocket closed");
                }
                Err(e) => {
                    tracing::debug!(upstream = %target, error = %e, "WebSocket closed with error");
                }
            }
        });

        builder
            .body(Body::empty())
            .unwrap_or_else(|_| response::bad_gateway())
    }
}

async fn read_response_head<S>(stream: &mut S) -> Result<ResponseHead, HandshakeError>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(HandshakeError::TooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let mut head = parse_response_head(&buf[..end])?;
    head.leftover = buf[end..].to_vec();
    Ok(head)
}

fn parse_response_head(data: &[u8]) -> Result<ResponseHead, HandshakeError> {
    let text = std::str::from_utf8(data).map_err(|_| HandshakeError::Malformed)?;
    let mut lines = text.split("\r\n");

    // HTTP/1.1 101 Switching Protocols
    let status_line = lines.next().ok_or(HandshakeError::Malformed)?;
    let code = status_line
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(HandshakeError::Malformed)?;
    let status = StatusCode::from_u16(code).map_err(|_| HandshakeError::Malformed)?;

    let mut headers = Vec::new();
    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(HandshakeError::Malformed)?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| HandshakeError::Malformed)?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| HandshakeError::Malformed)?;
        headers.push((name, value));
    }

    Ok(ResponseHead {
        status,
        headers,
        leftover: Vec::new(),
    })
}
