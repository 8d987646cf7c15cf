//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host)
//!     → matcher.rs (normalize host, match exact / capture app label)
//!     → router.rs (Login | Health | App(label) | NotFound)
//!     → http::server hands the request to that subsystem's router
//! ```
//!
//! # Design Decisions
//! - Routes derived from the domain at startup, immutable at runtime
//! - Deterministic: same host always reaches the same subsystem

pub mod matcher;
pub mod router;

pub use router::{AppName, Destination, HostRouter, RESERVED_LABELS};
