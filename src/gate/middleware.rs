//! Axum middleware wiring for [`EdgeGate`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::gate::{EdgeGate, RequestHead, Verdict};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;

/// Gate every request, then forward allowed ones to `next`.
///
/// Denials return immediately: no session refresh, no security headers,
/// and `next` never runs. Allowed and errored requests get a session
/// refresh, are forwarded, and the response is stamped with the refreshed
/// cookies and security headers.
pub async fn gate_middleware(
    State(gate): State<Arc<EdgeGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    if gate.bypasses(&path, &query) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let verdict = {
        let head = RequestHead {
            path: &path,
            query: &query,
            headers: request.headers(),
            peer,
        };
        gate.evaluate(&head).await
    };
    metrics::record_decision(verdict.label());

    if let Verdict::Error(ref e) = verdict {
        gate.report_error(e, &path);
    }

    if let Err(denial) = verdict.fail_open() {
        tracing::debug!(
            request_id = %request.request_id().unwrap_or("unknown"),
            path = %path,
            reason = denial.label(),
            "Request denied"
        );
        return denial.into_response();
    }

    let session = gate.refresh_session(request.headers(), &path).await;
    session.apply_to_request(request.headers_mut());

    let mut response = next.run(request).await;
    session.apply_to_response(response.headers_mut());
    gate.augment(response.headers_mut());
    response
}
