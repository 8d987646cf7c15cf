//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared application state once at startup
//! - Create the Axum router: host dispatch to login, health and app subrouters
//! - Wire up middleware (request ID, tracing, auth gate)
//! - Serve over plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware,
    response::Response,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::auth::{self, Authorizer};
use crate::config::GatewayConfig;
use crate::health::{self, HealthEngine};
use crate::http::request::{RequestIdExt, UuidRequestId};
use crate::http::response;
use crate::lifecycle::Shutdown;
use crate::proxy;
use crate::routing::{AppName, Destination, HostRouter};
use crate::session::SessionStore;
use crate::upstream::{UpstreamError, UpstreamTable};

/// Grace period for in-flight TLS connections on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub hosts: Arc<HostRouter>,
    pub upstreams: Arc<UpstreamTable>,
    pub sessions: Arc<dyn SessionStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub health: Arc<HealthEngine>,
}

/// Error type for building the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("failed to build health check client: {0}")]
    HealthClient(#[from] reqwest::Error),
}

/// Per-host subrouters, selected by `route_by_host`.
#[derive(Clone)]
struct Subrouters {
    hosts: Arc<HostRouter>,
    login: Router,
    health: Router,
    apps: Router,
}

/// The gateway's HTTP server.
pub struct GatewayServer {
    state: AppState,
    router: Router,
}

impl GatewayServer {
    /// Build the upstream table, health engine and router from a validated config.
    pub fn new(
        config: GatewayConfig,
        authorizer: Arc<dyn Authorizer>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ServerError> {
        let upstreams = Arc::new(UpstreamTable::from_config(&config)?);
        let health = Arc::new(HealthEngine::new(&config, &upstreams)?);

        let state = AppState {
            hosts: Arc::new(HostRouter::new(&config.domain)),
            config: Arc::new(config),
            upstreams,
            sessions,
            authorizer,
            health,
        };

        let router = Self::build_router(state.clone());
        Ok(Self { state, router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let apps = Router::new()
            .fallback(proxy::dispatch)
            .layer(middleware::from_fn_with_state(state.clone(), auth::require_login))
            .with_state(state.clone());

        let subrouters = Subrouters {
            hosts: state.hosts.clone(),
            login: auth::handlers::router(state.clone()),
            health: health::handler::router(state),
            apps,
        };

        Router::new()
            .fallback(route_by_host)
            .with_state(subrouters)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %req.request_id(),
                        method = %req.method(),
                        host = ?req.headers().get(header::HOST),
                        path = %req.uri().path(),
                    )
                }),
            )
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The complete application, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, domain = %self.state.config.domain, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: &Shutdown,
    ) -> std::io::Result<()> {
        tracing::info!(address = %addr, domain = %self.state.config.domain, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Select the subrouter for a request by its Host.
async fn route_by_host(State(subrouters): State<Subrouters>, mut req: Request<Body>) -> Response {
    let target = match subrouters.hosts.route(&req) {
        Destination::Login => subrouters.login,
        Destination::Health => subrouters.health,
        Destination::App(name) => {
            req.extensions_mut().insert(AppName(name));
            subrouters.apps
        }
        Destination::NotFound => {
            tracing::debug!(request_id = %req.request_id(), "No subsystem for host");
            return response::not_found();
        }
    };

    match target.oneshot(req).await {
        Ok(res) => res,
        Err(never) => match never {},
    }
}
