//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the edge gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The application the gate protects.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Fixed-window rate limiting on sensitive endpoints.
    pub rate_limit: RateLimitConfig,

    /// IP allow-list enforcement policy.
    pub access: AccessConfig,

    /// Security headers stamped on forwarded responses.
    pub headers: HeadersConfig,

    /// Paths that bypass some or all checks.
    pub exclusions: ExclusionConfig,

    /// Where the per-deployment security settings document lives.
    pub settings_store: SettingsStoreConfig,

    /// Session refresh provider.
    pub session: SessionConfig,

    /// Security event sink.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Application address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration for the request and both external calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for fetching the security settings document.
    pub settings_load_ms: u64,

    /// Deadline for the session refresh call.
    pub session_refresh_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            settings_load_ms: 2000,
            session_refresh_ms: 2000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Window length in seconds. Also sent back as `Retry-After`.
    pub window_secs: u64,

    /// Requests allowed per (client IP, path) within one window.
    pub max_requests: u32,

    /// Path prefixes subject to rate limiting.
    pub sensitive_prefixes: Vec<String>,

    /// How often expired entries are swept from the table.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            max_requests: 100,
            sensitive_prefixes: vec![
                "/api/auth".to_string(),
                "/login".to_string(),
                "/signup".to_string(),
                "/api/collaboration".to_string(),
            ],
            sweep_interval_secs: 5 * 60,
        }
    }
}

/// What an enabled allow-list with no entries means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyAllowlistPolicy {
    /// Treat the list as unconfigured and let everyone through.
    #[default]
    AllowAll,
    /// Nobody is on the list, so nobody gets in.
    DenyAll,
}

/// IP access policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    pub empty_allowlist: EmptyAllowlistPolicy,
}

/// Security response headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Value of the `Content-Security-Policy` header.
    pub content_security_policy: String,

    /// Additional headers, name to value.
    pub extra: BTreeMap<String, String>,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        let extra = [
            ("X-Frame-Options", "DENY"),
            ("X-Content-Type-Options", "nosniff"),
            ("Referrer-Policy", "strict-origin-when-cross-origin"),
            ("Permissions-Policy", "camera=(), microphone=(), geolocation=()"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            content_security_policy: [
                "default-src 'self'",
                "script-src 'self' 'unsafe-inline'",
                "style-src 'self' 'unsafe-inline'",
                "img-src 'self' data: https:",
                "font-src 'self' data:",
                "connect-src 'self' https: wss:",
                "frame-ancestors 'none'",
            ]
            .join("; "),
            extra,
        }
    }
}

/// Request exclusion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Path prefixes that never enter the gate.
    pub prefixes: Vec<String>,

    /// File extensions that do NOT exclude a path (everything else does).
    pub extension_exceptions: Vec<String>,

    /// Prefixes that skip the checks but still get session refresh and headers.
    pub static_prefixes: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            prefixes: vec![
                "/_next/static".to_string(),
                "/_next/image".to_string(),
                "/favicon.ico".to_string(),
            ],
            extension_exceptions: vec!["ts".to_string(), "tsx".to_string()],
            static_prefixes: vec![
                "/_next/".to_string(),
                "/static/".to_string(),
                "/assets/".to_string(),
            ],
        }
    }
}

/// Backend for the security settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettingsStoreKind {
    /// Serve `static_settings` from the config file.
    #[default]
    Static,
    /// Query a PostgREST-compatible endpoint.
    Rest,
}

/// Settings store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsStoreConfig {
    pub kind: SettingsStoreKind,

    /// Base URL of the data store (e.g., "https://project.example.co").
    pub base_url: String,

    /// API key sent as `apikey` and bearer token.
    pub api_key: String,

    /// Table holding the deployment row.
    pub table: String,

    /// Column holding the settings document.
    pub column: String,

    /// Security settings served by the static store, in wire format.
    pub static_settings: serde_json::Value,
}

impl Default for SettingsStoreConfig {
    fn default() -> Self {
        Self {
            kind: SettingsStoreKind::Static,
            base_url: String::new(),
            api_key: String::new(),
            table: "municipalities".to_string(),
            column: "settings".to_string(),
            static_settings: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// No session provider; refresh is a no-op.
    #[default]
    None,
    /// POST the request cookies to an auth provider.
    Http,
}

/// Session refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub kind: SessionKind,

    /// Auth provider refresh endpoint.
    pub refresh_url: String,

    /// Only cookies with this name prefix are passed back to the client.
    pub cookie_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: SessionKind::None,
            refresh_url: String::new(),
            cookie_prefix: "sb-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Structured log records on the `security_audit` target.
    #[default]
    Log,
    /// JSON POST to an external collector.
    Http,
}

/// Security event sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    pub kind: AuditKind,

    /// Collector endpoint for the HTTP sink.
    pub endpoint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
