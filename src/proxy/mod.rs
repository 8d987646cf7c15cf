//! Reverse proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Request on <app>.<domain>
//!     → dispatcher.rs (resolve upstream, rewrite templated headers)
//!     → http.rs (pooled hyper client, one pool per upstream)
//!       or websocket.rs (raw upgrade handshake, byte tunnel)
//!     → headers.rs (hop-by-hop, X-Forwarded-*, path join)
//!     → Response streamed back to client
//! ```
//!
//! # Design Decisions
//! - Upstream certificates are not verified (tls.rs); upstreams live on a
//!   trusted network
//! - WebSocket requests fall back to the HTTP target when no WebSocket
//!   target is configured

pub mod dispatcher;
pub mod headers;
pub mod http;
pub mod tls;
pub mod websocket;

pub use dispatcher::dispatch;
pub use http::HttpForwarder;
pub use websocket::WsForwarder;
