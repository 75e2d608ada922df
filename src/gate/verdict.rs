//! Outcome of running the gate's checks on one request.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::security::patterns::PatternClass;
use crate::security::rate_limit::CounterStoreError;

pub const IP_BLOCKED_BODY: &str = "Access restricted by IP policy";
pub const SUSPICIOUS_BODY: &str = "Access Denied";
pub const RATE_LIMITED_BODY: &str = r#"{"error":"Too Many Requests"}"#;

/// `Allow | Deny | Error`, with [`Verdict::fail_open`] mapping `Error` to
/// allow.
#[derive(Debug)]
pub enum Verdict {
    Allow {
        /// Checks were skipped for a static asset path.
        fast_path: bool,
    },
    Deny(Denial),
    Error(GateError),
}

impl Verdict {
    /// Availability over strictness: an internal error lets the request
    /// through. Returns the denial when there is one.
    pub fn fail_open(self) -> Result<(), Denial> {
        match self {
            Verdict::Allow { .. } | Verdict::Error(_) => Ok(()),
            Verdict::Deny(denial) => Err(denial),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Allow { fast_path: true } => "static",
            Verdict::Allow { fast_path: false } => "allow",
            Verdict::Deny(d) => d.label(),
            Verdict::Error(_) => "error",
        }
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    IpBlocked,
    Suspicious(PatternClass),
    RateLimited { retry_after: Duration },
}

impl Denial {
    pub fn label(&self) -> &'static str {
        match self {
            Denial::IpBlocked => "ip_blocked",
            Denial::Suspicious(_) => "suspicious",
            Denial::RateLimited { .. } => "rate_limited",
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let (status, content_type, body, retry_after) = match self {
            Denial::IpBlocked => (StatusCode::FORBIDDEN, "text/plain", IP_BLOCKED_BODY, None),
            Denial::Suspicious(_) => (StatusCode::FORBIDDEN, "text/plain", SUSPICIOUS_BODY, None),
            Denial::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "application/json",
                RATE_LIMITED_BODY,
                Some(retry_after),
            ),
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(retry_after) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

/// An internal failure while evaluating the checks.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("rate limit store failed: {0}")]
    CounterStore(#[from] CounterStoreError),

    #[error("gate check panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_open_policy() {
        assert!(Verdict::Allow { fast_path: false }.fail_open().is_ok());
        assert!(Verdict::Error(GateError::Panicked("boom".into())).fail_open().is_ok());
        assert_eq!(
            Verdict::Deny(Denial::IpBlocked).fail_open(),
            Err(Denial::IpBlocked)
        );
    }

    #[test]
    fn test_rate_limited_response_shape() {
        let res = Denial::RateLimited {
            retry_after: Duration::from_secs(900),
        }
        .into_response();

        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "900");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_suspicious_response_is_plain_text_only() {
        let res = Denial::Suspicious(PatternClass::Traversal).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(res.headers().len(), 1);
    }
}
