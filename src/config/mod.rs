//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → GatewayConfig (validated, immutable)
//!     → upstream table, authorizer, health engine built once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields except `domain`, the upstreams and one identity provider
//!   have defaults
//! - Any validation error is fatal before the listener binds

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    GatewayConfig, GithubConfig, GoogleConfig, HealthConfig, ListenerConfig, ObservabilityConfig,
    SessionConfig, TimeoutConfig, TlsConfig, UpstreamSpec,
};
pub use validation::ValidationError;
