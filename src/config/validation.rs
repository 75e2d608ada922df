//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges, addresses and the
//! fields each selected backend needs. All errors are returned, not just
//! the first.

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::{AuditKind, GateConfig, SessionKind, SettingsStoreKind};

/// Longest accepted rate-limit window (one week).
pub const MAX_RATE_LIMIT_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_socket_addr(&mut errors, "upstream.address", &config.upstream.address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    } else if rl.window_secs > MAX_RATE_LIMIT_WINDOW_SECS {
        errors.push(ValidationError::new(
            "rate_limit.window_secs",
            format!("must be at most {}", MAX_RATE_LIMIT_WINDOW_SECS),
        ));
    }
    if rl.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
    for prefix in &rl.sensitive_prefixes {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::new(
                "rate_limit.sensitive_prefixes",
                format!("'{}' must start with '/'", prefix),
            ));
        }
    }

    if HeaderValue::from_str(&config.headers.content_security_policy).is_err() {
        errors.push(ValidationError::new(
            "headers.content_security_policy",
            "not a valid header value",
        ));
    }
    for (name, value) in &config.headers.extra {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "headers.extra",
                format!("'{}' is not a valid header name", name),
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                "headers.extra",
                format!("value for '{}' is not a valid header value", name),
            ));
        }
    }

    if config.settings_store.kind == SettingsStoreKind::Rest {
        if url::Url::parse(&config.settings_store.base_url).is_err() {
            errors.push(ValidationError::new(
                "settings_store.base_url",
                "a rest settings store needs an absolute base URL",
            ));
        }
        if config.settings_store.table.is_empty() || config.settings_store.column.is_empty() {
            errors.push(ValidationError::new(
                "settings_store.table",
                "table and column must be set",
            ));
        }
    }

    if config.session.kind == SessionKind::Http && url::Url::parse(&config.session.refresh_url).is_err() {
        errors.push(ValidationError::new(
            "session.refresh_url",
            "an http session refresher needs an absolute URL",
        ));
    }

    if config.audit.kind == AuditKind::Http && url::Url::parse(&config.audit.endpoint).is_err() {
        errors.push(ValidationError::new(
            "audit.endpoint",
            "an http audit sink needs an absolute URL",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid socket address", value),
        ));
    }
}
