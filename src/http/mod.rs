//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → routing (Host → login | health | app)
//!     → auth gate → proxy dispatcher (app hosts only)
//!     → response.rs (gateway-generated errors and redirects)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, GatewayServer, ServerError};
