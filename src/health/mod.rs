//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /check on health.<domain> (handler.rs)
//!     → engine.rs: one task per upstream probe + one certificate task
//!     → cert.rs: read PEM, classify validity window
//!     → join all tasks, build HealthSnapshot, publish
//!     → 200 if everything is healthy, else 503
//! ```

pub mod cert;
pub mod engine;
pub mod handler;

pub use cert::{CertReport, CertStatus};
pub use engine::{HealthEngine, HealthSnapshot, UpstreamStatus};
