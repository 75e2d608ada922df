//! Best-effort client IP resolution.
//!
//! The forwarding headers are client-supplied and are not validated as IP
//! addresses. Anything decided from this value is only as trustworthy as
//! the reverse proxy that sets those headers.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Returned when no source yields an address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client IP.
///
/// Precedence: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// connection's peer address, then [`UNKNOWN_CLIENT`]. Blank values fall
/// through to the next source.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}
