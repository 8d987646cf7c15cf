//! Authenticating reverse-proxy gateway.
//!
//! Fronts backend services at `<app>.<domain>`, gates protected apps behind
//! an OAuth login on `oauth.<domain>`, and reports upstream and certificate
//! health on `health.<domain>`.

pub mod auth;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod session;
pub mod upstream;

pub use config::GatewayConfig;
pub use http::{AppState, GatewayServer};
pub use lifecycle::Shutdown;
