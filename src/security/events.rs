//! Security events and the sinks that receive them.
//!
//! Events are fire-and-forget: recording one never blocks or fails the
//! request that produced it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    RateLimitExceeded,
    SuspiciousRequest,
    IpBlocked,
    MiddlewareError,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousRequest => "SUSPICIOUS_REQUEST",
            Self::IpBlocked => "IP_BLOCKED",
            Self::MiddlewareError => "MIDDLEWARE_ERROR",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A structured record of a policy decision or anomaly.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, severity: Severity) -> Self {
        Self {
            kind,
            severity,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a metadata field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Receives security events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Writes events as structured log records on the `security_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        let severity = event.severity.as_str();
        let metadata = Value::Object(event.metadata);
        match event.severity {
            Severity::Low => {
                tracing::info!(target: "security_audit", kind = %event.kind, severity, %metadata, "Security event")
            }
            Severity::Medium => {
                tracing::warn!(target: "security_audit", kind = %event.kind, severity, %metadata, "Security event")
            }
            Severity::High | Severity::Critical => {
                tracing::error!(target: "security_audit", kind = %event.kind, severity, %metadata, "Security event")
            }
        }
    }
}

/// Events queued for the HTTP sink before new ones are dropped.
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

/// POSTs each event as JSON to an external collector.
///
/// Events go through a bounded queue drained by one delivery task, so at
/// most one POST is in flight. When the queue is full the event is dropped
/// with a warning.
#[derive(Debug, Clone)]
pub struct HttpAuditSink {
    queue: mpsc::Sender<SecurityEvent>,
}

impl HttpAuditSink {
    /// Start the delivery task on the current runtime.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let (sink, rx) = Self::with_capacity(AUDIT_QUEUE_CAPACITY);
        let endpoint = endpoint.into();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(deliver(client, endpoint, rx));
            }
            Err(_) => tracing::warn!("No runtime available, security events will be dropped"),
        }
        sink
    }

    fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (queue, rx) = mpsc::channel(capacity);
        (Self { queue }, rx)
    }
}

impl AuditSink for HttpAuditSink {
    fn record(&self, event: SecurityEvent) {
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(kind = %event.kind, "Audit queue full, dropping security event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(kind = %event.kind, "Audit delivery stopped, dropping security event");
            }
        }
    }
}

async fn deliver(client: reqwest::Client, endpoint: String, mut rx: mpsc::Receiver<SecurityEvent>) {
    while let Some(event) = rx.recv().await {
        match client.post(&endpoint).json(&event).send().await {
            Ok(res) if !res.status().is_success() => {
                tracing::warn!(kind = %event.kind, status = %res.status(), "Audit sink rejected security event");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(kind = %event.kind, error = %e, "Failed to deliver security event");
            }
        }
    }
    tracing::debug!("Audit delivery task exiting");
}
