//! Shared utilities for gate integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    Router,
};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use edge_gate::config::GateConfig;
use edge_gate::gate::{gate_middleware, EdgeGate, GateComponents};
use edge_gate::security::events::{AuditSink, SecurityEvent, SecurityEventKind};
use edge_gate::security::rate_limit::RateLimiter;
use edge_gate::security::session::{SessionError, SessionRefresher, SessionUpdate};
use edge_gate::security::settings::{SettingsError, SettingsStore, StaticSettingsStore};
use edge_gate::security::ManualClock;

pub const APP_BODY: &str = "hello from app";
pub const REFRESHED_COOKIE: &str = "sb-access-token=refreshed; Path=/; HttpOnly";

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Session refresher that counts calls and always refreshes one cookie.
#[derive(Debug, Default)]
pub struct CountingSession {
    calls: AtomicUsize,
}

impl CountingSession {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRefresher for CountingSession {
    async fn refresh(&self, _headers: &HeaderMap) -> Result<SessionUpdate, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionUpdate {
            set_cookies: vec![HeaderValue::from_static(REFRESHED_COOKIE)],
        })
    }
}

/// Session provider with a bug.
pub struct PanickingSession;

#[async_trait]
impl SessionRefresher for PanickingSession {
    async fn refresh(&self, _headers: &HeaderMap) -> Result<SessionUpdate, SessionError> {
        panic!("session provider bug");
    }
}

/// Audit sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<SecurityEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, event: SecurityEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Settings store that never answers in time.
pub struct HangingStore;

#[async_trait]
impl SettingsStore for HangingStore {
    async fn fetch(&self) -> Result<Value, SettingsError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Value::Null)
    }
}

/// Settings store that panics.
pub struct PanickingStore;

#[async_trait]
impl SettingsStore for PanickingStore {
    async fn fetch(&self) -> Result<Value, SettingsError> {
        panic!("settings store exploded");
    }
}

pub fn allowlist(enabled: bool, ips: &[&str]) -> Value {
    json!({ "access": { "ipWhitelistEnabled": enabled, "allowedIPs": ips } })
}

/// A gate wired to in-process stubs, plus handles to inspect them.
pub struct Harness {
    pub gate: Arc<EdgeGate>,
    pub session: Arc<CountingSession>,
    pub audit: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub app_calls: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(config: &GateConfig, settings: Value) -> Self {
        Self::with_store(config, Arc::new(StaticSettingsStore::new(settings)))
    }

    pub fn with_store(config: &GateConfig, store: Arc<dyn SettingsStore>) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self::with_limiter(config, store, Arc::new(RateLimiter::with_clock(clock.clone())), clock)
    }

    pub fn with_limiter(
        config: &GateConfig,
        store: Arc<dyn SettingsStore>,
        limiter: Arc<RateLimiter>,
        clock: Arc<ManualClock>,
    ) -> Self {
        Self::build(config, store, limiter, clock, None)
    }

    /// Gate whose session provider is `refresher` instead of the counter.
    pub fn with_refresher(config: &GateConfig, refresher: Arc<dyn SessionRefresher>) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self::build(
            config,
            Arc::new(StaticSettingsStore::default()),
            Arc::new(RateLimiter::with_clock(clock.clone())),
            clock,
            Some(refresher),
        )
    }

    fn build(
        config: &GateConfig,
        store: Arc<dyn SettingsStore>,
        limiter: Arc<RateLimiter>,
        clock: Arc<ManualClock>,
        refresher: Option<Arc<dyn SessionRefresher>>,
    ) -> Self {
        let session = Arc::new(CountingSession::default());
        let audit = Arc::new(RecordingSink::default());
        let components = GateComponents {
            settings: store,
            session: refresher.unwrap_or_else(|| session.clone() as Arc<dyn SessionRefresher>),
            audit: audit.clone(),
        };

        Self {
            gate: Arc::new(EdgeGate::new(config, components, limiter)),
            session,
            audit,
            clock,
            app_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The gate in front of an in-process application.
    pub fn router(&self) -> Router {
        let app_calls = self.app_calls.clone();
        Router::new()
            .fallback(move |request: Request<Body>| {
                let app_calls = app_calls.clone();
                async move {
                    app_calls.fetch_add(1, Ordering::SeqCst);
                    let cookie = request
                        .headers()
                        .get("cookie")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    (StatusCode::OK, [("x-seen-cookie", cookie)], APP_BODY).into_response()
                }
            })
            .layer(from_fn_with_state(self.gate.clone(), gate_middleware))
    }

    pub fn app_calls(&self) -> usize {
        self.app_calls.load(Ordering::SeqCst)
    }
}

/// GET `uri` as `ip` (via `X-Forwarded-For`).
pub fn get_from(ip: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header("user-agent", "gate-tests/1.0")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
