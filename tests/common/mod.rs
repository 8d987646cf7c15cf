//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

use subgate::auth::{AuthError, Authorizer, Identity};
use subgate::config::parse_config;
use subgate::session::CookieStore;
use subgate::GatewayServer;

pub const DOMAIN: &str = "example.com";
pub const IDP_URL: &str = "https://idp.test/authorize";

/// Request heads received by a mock backend, in arrival order.
pub type Recorded = Arc<Mutex<Vec<String>>>;

/// Authorizer that accepts the code "good" as alice and denies anything else.
/// The code "crlf" yields an identity that is not a legal header value.
pub struct FakeAuthorizer;

#[async_trait]
impl Authorizer for FakeAuthorizer {
    fn authorization_url(&self, state: &str) -> String {
        format!("{IDP_URL}?state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<Identity, AuthError> {
        match code {
            "good" => Ok(Identity::new("alice")),
            "crlf" => Ok(Identity::new("eve\r\nX-Admin: 1")),
            _ => Err(AuthError::Denied("mallory".to_string())),
        }
    }
}

/// Build a gateway from TOML upstream/health sections, with the fake authorizer.
pub fn gateway(extra_toml: &str) -> GatewayServer {
    let toml = format!(
        "domain = \"{DOMAIN}\"\n\n[github]\nclient_id = \"id\"\nclient_secret = \"secret\"\nauthorized_org_id = 1\n\n{extra_toml}"
    );
    let config = parse_config(&toml).unwrap();
    let sessions = Arc::new(CookieStore::new(DOMAIN, config.session.max_age_secs));
    GatewayServer::new(config, Arc::new(FakeAuthorizer), sessions).unwrap()
}

pub fn request(host: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().uri(uri).header(header::HOST, host)
}

pub fn get(host: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = request(host, uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_string(res: Response<Body>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `name=value` part of a Set-Cookie header.
pub fn cookie_pair(res: &Response<Body>) -> String {
    res.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

pub fn location(res: &Response<Body>) -> String {
    res.headers()[header::LOCATION].to_str().unwrap().to_string()
}

/// The `state` query parameter of an authorization redirect.
pub fn oauth_state(location: &str) -> String {
    location
        .split_once("state=")
        .map(|(_, state)| state.to_string())
        .unwrap()
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Backend that records each request head and answers 200 with `body`.
pub async fn start_recording_backend(body: &'static str) -> (SocketAddr, Recorded) {
    let recorded = Recorded::default();
    let seen = recorded.clone();
    let addr = start_programmable_backend(move |head| {
        seen.lock().unwrap().push(head);
        async move { (200, body.to_string()) }
    })
    .await;
    (addr, recorded)
}

/// Start a programmable mock backend. `f` receives the raw request head.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut socket).await else {
                    return;
                };
                let (status, body) = f(head).await;
                let status_text = match status {
                    200 => "200 OK",
                    204 => "204 No Content",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// WebSocket echo backend that records each raw handshake head.
pub async fn start_ws_echo_backend() -> (SocketAddr, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Recorded::default();
    let seen = recorded.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut socket).await else {
                    return;
                };
                seen.lock().unwrap().push(head.clone());

                // Exact-case lookup, like case-sensitive upstreams do.
                let Some(key) = head
                    .lines()
                    .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
                else {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                        .await;
                    return;
                };
                let response = format!(
                    "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
                    derive_accept_key(key.trim().as_bytes())
                );
                if socket.write_all(response.as_bytes()).await.is_err() {
                    return;
                }

                let mut ws = WebSocketStream::from_raw_socket(socket, Role::Server, None).await;
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });
    (addr, recorded)
}

/// Write a self-signed certificate valid between the given dates.
pub fn write_cert(dir: &Path, not_before: (i32, u8, u8), not_after: (i32, u8, u8)) -> PathBuf {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(vec![format!("*.{DOMAIN}")]).unwrap();
    params.not_before = rcgen::date_time_ymd(not_before.0, not_before.1, not_before.2);
    params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
    let cert = params.self_signed(&key).unwrap();

    let path = dir.join("cert.pem");
    std::fs::write(&path, cert.pem()).unwrap();
    path
}

/// Give a freshly spawned server a moment to start accepting.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
