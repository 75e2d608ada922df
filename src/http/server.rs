//! HTTP server setup and upstream forwarding.
//!
//! # Layer order (outermost first)
//! ```text
//! TraceLayer
//!   → SetRequestIdLayer / PropagateRequestIdLayer
//!   → TimeoutLayer
//!   → gate_middleware
//!   → forward (fallback handler, every method and path)
//! ```

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::gate::{gate_middleware, EdgeGate};
use crate::http::request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::rate_limit::{spawn_sweeper, RateLimiter};
use crate::security::settings::SettingsError;

pub const UPSTREAM_FAILED_BODY: &str = "Upstream request failed";

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid upstream address '{0}'")]
    InvalidUpstream(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// State for the forwarding handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// The gate in front of one upstream application.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    gate: Arc<EdgeGate>,
}

impl HttpServer {
    /// Create a server with the collaborators selected in config.
    pub fn new(config: GateConfig) -> Result<Self, ServerError> {
        let limiter = Arc::new(RateLimiter::new());
        let gate = Arc::new(EdgeGate::from_config(&config, limiter)?);
        Self::with_gate(config, gate)
    }

    /// Create a server around an already-built gate.
    pub fn with_gate(config: GateConfig, gate: Arc<EdgeGate>) -> Result<Self, ServerError> {
        let upstream = Authority::from_str(&config.upstream.address)
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState { client, upstream };

        let router = Self::build_router(&config, state, gate.clone());
        Ok(Self {
            router,
            config,
            gate,
        })
    }

    #[allow(deprecated)]
    fn build_router(config: &GateConfig, state: AppState, gate: Arc<EdgeGate>) -> Router {
        Router::new()
            .fallback(forward)
            .with_state(state)
            .layer(from_fn_with_state(gate, gate_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gate(&self) -> &Arc<EdgeGate> {
        &self.gate
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Serve until `shutdown` fires.
    ///
    /// Configs received on `config_updates` are applied to the gate. The
    /// listener and upstream address are fixed for the life of the server.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        let sweeper = spawn_sweeper(
            self.gate.limiter().clone(),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            shutdown.subscribe(),
        );

        let gate = self.gate.clone();
        let current = self.config.clone();
        let mut applier_shutdown = shutdown.subscribe();
        let applier = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(new_config) = update else { break };
                        if new_config.upstream.address != current.upstream.address
                            || new_config.listener.bind_address != current.listener.bind_address
                        {
                            tracing::warn!("Listener and upstream changes take effect after a restart");
                        }
                        gate.reload(&new_config);
                    }
                    _ = applier_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server_shutdown = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        shutdown.trigger();
        let _ = sweeper.await;
        applier.abort();

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward the request to the upstream application unchanged apart from
/// its URI. Upstream failures become 502.
async fn forward(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().unwrap_or("unknown").to_string();

    let (mut parts, body) = request.into_parts();
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, UPSTREAM_FAILED_BODY).into_response();
        }
    };

    // The upstream hop is always HTTP/1.1, whatever the client spoke.
    parts.version = Version::HTTP_11;

    tracing::debug!(request_id = %request_id, uri = %parts.uri, "Forwarding request");

    let upstream: Result<hyper::Response<Incoming>, _> =
        state.client.request(Request::from_parts(parts, body)).await;
    match upstream {
        Ok(response) => {
            metrics::record_upstream(response.status().as_u16(), start);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16(), start);
            (StatusCode::BAD_GATEWAY, UPSTREAM_FAILED_BODY).into_response()
        }
    }
}
