//! The edge gate: one pass over every gated request.
//!
//! # Pipeline
//! ```text
//! START
//!   → static asset fast-path (pattern scan only, then refresh + headers)
//!   → load settings
//!   → IP policy            deny 403
//!   → suspicious patterns  deny 403 (no security headers)
//!   → rate limit           deny 429 (sensitive paths only)
//!   → session refresh
//!   → header augmentation
//!   → forward to application
//! ERROR (store failure or panic inside the checks)
//!   → MIDDLEWARE_ERROR event
//!   → fail open: refresh + headers + forward
//! ```
//!
//! Nothing retries and nothing runs after a denial. The only state shared
//! between requests is the rate limiter's counter table.

pub mod middleware;
pub mod verdict;

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;
use futures_util::FutureExt;

use crate::config::{AuditKind, GateConfig, SessionKind, SettingsStoreKind};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::routing::Exclusions;
use crate::security::events::{AuditSink, HttpAuditSink, SecurityEvent, SecurityEventKind, Severity, TracingAuditSink};
use crate::security::headers::HeaderAugmenter;
use crate::security::patterns::{request_target, truncate_chars, PatternDetector, ScanOutcome};
use crate::security::rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
use crate::security::session::{HttpSessionRefresher, NoopSessionRefresher, SessionRefresher, SessionUpdate};
use crate::security::settings::{
    RestSettingsStore, SettingsError, SettingsLoader, SettingsStore, StaticSettingsStore,
};
use crate::security::{resolve_client_ip, IpDecision, IpPolicy};

pub use middleware::gate_middleware;
pub use verdict::{Denial, GateError, Verdict};

/// Longest URL recorded in a suspicious-request event.
const MAX_LOGGED_URL_CHARS: usize = 200;

/// The external collaborators the gate talks to.
#[derive(Clone)]
pub struct GateComponents {
    pub settings: Arc<dyn SettingsStore>,
    pub session: Arc<dyn SessionRefresher>,
    pub audit: Arc<dyn AuditSink>,
}

impl GateComponents {
    /// Build the collaborators selected in config.
    pub fn from_config(config: &GateConfig) -> Result<Self, SettingsError> {
        let client = reqwest::Client::new();

        let settings: Arc<dyn SettingsStore> = match config.settings_store.kind {
            SettingsStoreKind::Static => Arc::new(StaticSettingsStore::new(
                config.settings_store.static_settings.clone(),
            )),
            SettingsStoreKind::Rest => Arc::new(RestSettingsStore::new(
                client.clone(),
                &config.settings_store,
            )?),
        };

        let session: Arc<dyn SessionRefresher> = match config.session.kind {
            SessionKind::None => Arc::new(NoopSessionRefresher),
            SessionKind::Http => Arc::new(HttpSessionRefresher::new(
                client.clone(),
                config.session.refresh_url.clone(),
                config.session.cookie_prefix.clone(),
            )),
        };

        let audit: Arc<dyn AuditSink> = match config.audit.kind {
            AuditKind::Log => Arc::new(TracingAuditSink),
            AuditKind::Http => Arc::new(HttpAuditSink::new(client, config.audit.endpoint.clone())),
        };

        Ok(Self {
            settings,
            session,
            audit,
        })
    }
}

/// Config-derived rules, swapped as a unit on reload.
struct Policies {
    exclusions: Exclusions,
    ip: IpPolicy,
    rate_limit: RateLimitPolicy,
    headers: HeaderAugmenter,
    settings_timeout: Duration,
    session_timeout: Duration,
}

impl Policies {
    fn from_config(config: &GateConfig) -> Self {
        Self {
            exclusions: Exclusions::from_config(&config.exclusions),
            ip: IpPolicy::new(config.access.empty_allowlist),
            rate_limit: RateLimitPolicy::from_config(&config.rate_limit),
            headers: HeaderAugmenter::from_config(&config.headers),
            settings_timeout: Duration::from_millis(config.timeouts.settings_load_ms),
            session_timeout: Duration::from_millis(config.timeouts.session_refresh_ms),
        }
    }
}

/// What the gate needs to know about a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub path: &'a str,
    /// Raw query string without the leading `?`.
    pub query: &'a str,
    pub headers: &'a HeaderMap,
    pub peer: Option<SocketAddr>,
}

pub struct EdgeGate {
    policies: ArcSwap<Policies>,
    components: GateComponents,
    detector: PatternDetector,
    limiter: Arc<RateLimiter>,
}

impl EdgeGate {
    pub fn new(config: &GateConfig, components: GateComponents, limiter: Arc<RateLimiter>) -> Self {
        Self {
            policies: ArcSwap::from_pointee(Policies::from_config(config)),
            components,
            detector: PatternDetector::new(),
            limiter,
        }
    }

    /// Gate with the collaborators selected in config.
    pub fn from_config(config: &GateConfig, limiter: Arc<RateLimiter>) -> Result<Self, SettingsError> {
        Ok(Self::new(config, GateComponents::from_config(config)?, limiter))
    }

    /// Replace the signature set.
    pub fn with_detector(mut self, detector: PatternDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Apply a reloaded config. Counters and collaborators are kept.
    pub fn reload(&self, config: &GateConfig) {
        self.policies.store(Arc::new(Policies::from_config(config)));
        tracing::info!(
            window_secs = config.rate_limit.window_secs,
            max_requests = config.rate_limit.max_requests,
            "Gate policies reloaded"
        );
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Whether the request skips the gate entirely. A suspicious target is
    /// never bypassed, whatever its prefix.
    pub fn bypasses(&self, path: &str, query: &str) -> bool {
        self.policies.load().exclusions.bypasses_gate(path)
            && self.detector.scan(path, query) == ScanOutcome::Clean
    }

    /// Run the checks. Panics inside them surface as [`Verdict::Error`].
    ///
    /// Static assets skip settings, IP and rate checks but are still
    /// screened for attack patterns.
    pub async fn evaluate(&self, head: &RequestHead<'_>) -> Verdict {
        let policies = self.policies.load_full();
        if policies.exclusions.is_static_asset(head.path) {
            if self.detector.scan(head.path, head.query) == ScanOutcome::Clean {
                return Verdict::Allow { fast_path: true };
            }
            let client_ip = resolve_client_ip(head.headers, head.peer);
            return match self.screen_patterns(head, &client_ip) {
                Some(denial) => Verdict::Deny(denial),
                None => Verdict::Allow { fast_path: true },
            };
        }

        let checks = AssertUnwindSafe(self.run_checks(&policies, head)).catch_unwind();
        match checks.await {
            Ok(Ok(None)) => Verdict::Allow { fast_path: false },
            Ok(Ok(Some(denial))) => Verdict::Deny(denial),
            Ok(Err(e)) => Verdict::Error(e),
            Err(payload) => Verdict::Error(GateError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    async fn run_checks(
        &self,
        policies: &Policies,
        head: &RequestHead<'_>,
    ) -> Result<Option<Denial>, GateError> {
        let client_ip = resolve_client_ip(head.headers, head.peer);

        let settings = SettingsLoader::new(self.components.settings.clone(), policies.settings_timeout)
            .load()
            .await;

        if policies.ip.check(&settings, &client_ip) == IpDecision::Deny {
            self.emit(
                SecurityEvent::new(SecurityEventKind::IpBlocked, Severity::Medium)
                    .with("clientIP", client_ip.as_str())
                    .with("path", head.path),
            );
            return Ok(Some(Denial::IpBlocked));
        }

        if let Some(denial) = self.screen_patterns(head, &client_ip) {
            return Ok(Some(denial));
        }

        if policies.rate_limit.applies_to(head.path) {
            let decision = self
                .limiter
                .check(&client_ip, head.path, &policies.rate_limit)
                .await?;
            if let RateLimitDecision::Limited { count, retry_after } = decision {
                self.emit(
                    SecurityEvent::new(SecurityEventKind::RateLimitExceeded, Severity::High)
                        .with("clientIP", client_ip.as_str())
                        .with("path", head.path)
                        .with("count", count)
                        .with("limit", policies.rate_limit.max_requests)
                        .with("windowSecs", policies.rate_limit.window.as_secs()),
                );
                return Ok(Some(Denial::RateLimited { retry_after }));
            }
        }

        Ok(None)
    }

    fn screen_patterns(&self, head: &RequestHead<'_>, client_ip: &str) -> Option<Denial> {
        let ScanOutcome::Suspicious(class) = self.detector.scan(head.path, head.query) else {
            return None;
        };

        let user_agent = head
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let url = request_target(head.path, head.query);
        self.emit(
            SecurityEvent::new(SecurityEventKind::SuspiciousRequest, Severity::High)
                .with("clientIP", client_ip)
                .with("path", head.path)
                .with("query", head.query)
                .with("userAgent", user_agent)
                .with("url", truncate_chars(&url, MAX_LOGGED_URL_CHARS))
                .with("pattern", class.as_str()),
        );
        Some(Denial::Suspicious(class))
    }

    /// Refresh the session, ignoring any failure. A panicking provider is
    /// reported as a middleware error and the request proceeds.
    pub async fn refresh_session(&self, headers: &HeaderMap, path: &str) -> SessionUpdate {
        let timeout = self.policies.load().session_timeout;
        let refresh = with_deadline(timeout, self.components.session.refresh(headers));
        match AssertUnwindSafe(refresh).catch_unwind().await {
            Ok(Ok(Ok(update))) => update,
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "Session refresh failed, continuing");
                SessionUpdate::default()
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Session refresh timed out, continuing");
                SessionUpdate::default()
            }
            Err(payload) => {
                let error = GateError::Panicked(panic_message(payload.as_ref()));
                self.report_error(&error, path);
                SessionUpdate::default()
            }
        }
    }

    /// Stamp the security headers.
    pub fn augment(&self, headers: &mut HeaderMap) {
        self.policies.load().headers.augment(headers);
    }

    /// Record an internal error before failing open.
    pub fn report_error(&self, error: &GateError, path: &str) {
        tracing::error!(error = %error, path = %path, "Gate check failed, allowing request");
        self.emit(
            SecurityEvent::new(SecurityEventKind::MiddlewareError, Severity::High)
                .with("error", error.to_string())
                .with("path", path),
        );
    }

    fn emit(&self, event: SecurityEvent) {
        metrics::record_security_event(event.kind.as_str());
        self.components.audit.record(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
