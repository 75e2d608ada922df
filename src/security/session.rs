//! Session refresh.
//!
//! The gate hands the request's cookies to the auth provider and carries
//! any refreshed cookies through to both the forwarded request and the
//! client response. It never inspects the outcome: a failed refresh is
//! logged and the request proceeds.

use async_trait::async_trait;
use axum::http::header::{self, HeaderMap, HeaderValue};

use crate::resilience::Elapsed;

/// Cookies produced by a refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub set_cookies: Vec<HeaderValue>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.set_cookies.is_empty()
    }

    /// `(name, value)` of each refreshed cookie.
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        self.set_cookies
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
            .collect()
    }

    /// Rewrite the request `Cookie` header so the application sees the
    /// refreshed values.
    pub fn apply_to_request(&self, headers: &mut HeaderMap) {
        let refreshed = self.cookie_pairs();
        if refreshed.is_empty() {
            return;
        }

        let mut pairs: Vec<(String, String)> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
            .collect();

        for (name, value) in refreshed {
            match pairs.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => pairs.push((name, value)),
            }
        }

        let joined = pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&joined) {
            Ok(v) => {
                headers.insert(header::COOKIE, v);
            }
            Err(_) => tracing::warn!("Refreshed cookies produced an invalid Cookie header"),
        }
    }

    /// Append the `Set-Cookie` headers to a response.
    pub fn apply_to_response(&self, headers: &mut HeaderMap) {
        for cookie in &self.set_cookies {
            headers.append(header::SET_COOKIE, cookie.clone());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("session provider returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("session refresh {0}")]
    TimedOut(#[from] Elapsed),
}

#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, request_headers: &HeaderMap) -> Result<SessionUpdate, SessionError>;
}

/// For deployments without a session provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionRefresher;

#[async_trait]
impl SessionRefresher for NoopSessionRefresher {
    async fn refresh(&self, _request_headers: &HeaderMap) -> Result<SessionUpdate, SessionError> {
        Ok(SessionUpdate::default())
    }
}

/// Posts the request's cookies to an auth provider refresh endpoint.
///
/// Only `Set-Cookie` values whose name starts with `cookie_prefix` are
/// passed on.
#[derive(Debug, Clone)]
pub struct HttpSessionRefresher {
    client: reqwest::Client,
    refresh_url: String,
    cookie_prefix: String,
}

impl HttpSessionRefresher {
    pub fn new(
        client: reqwest::Client,
        refresh_url: impl Into<String>,
        cookie_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            refresh_url: refresh_url.into(),
            cookie_prefix: cookie_prefix.into(),
        }
    }
}

#[async_trait]
impl SessionRefresher for HttpSessionRefresher {
    async fn refresh(&self, request_headers: &HeaderMap) -> Result<SessionUpdate, SessionError> {
        let cookies: Vec<&str> = request_headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if cookies.is_empty() {
            return Ok(SessionUpdate::default());
        }

        let res = self
            .client
            .post(&self.refresh_url)
            .header(reqwest::header::COOKIE, cookies.join("; "))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(SessionError::Status(res.status()));
        }

        let set_cookies = res
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter(|v| {
                v.to_str()
                    .map(|s| s.trim_start().starts_with(self.cookie_prefix.as_str()))
                    .unwrap_or(false)
            })
            .filter_map(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
            .collect();

        Ok(SessionUpdate { set_cookies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(cookies: &[&'static str]) -> SessionUpdate {
        SessionUpdate {
            set_cookies: cookies.iter().map(|c| HeaderValue::from_static(c)).collect(),
        }
    }

    #[test]
    fn test_cookie_pairs() {
        let u = update(&["sb-access=new; Path=/; HttpOnly", "sb-refresh=r2; Max-Age=3600"]);
        assert_eq!(
            u.cookie_pairs(),
            vec![
                ("sb-access".to_string(), "new".to_string()),
                ("sb-refresh".to_string(), "r2".to_string())
            ]
        );
    }

    #[test]
    fn test_apply_to_request_replaces_and_appends() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sb-access=old"));

        update(&["sb-access=new; Path=/", "sb-refresh=r2"]).apply_to_request(&mut headers);
        assert_eq!(headers[header::COOKIE], "theme=dark; sb-access=new; sb-refresh=r2");
    }

    #[test]
    fn test_apply_to_response_appends() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("app=1"));

        update(&["sb-access=new"]).apply_to_response(&mut headers);
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_empty_update_leaves_request_alone() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("a=1"));
        SessionUpdate::default().apply_to_request(&mut headers);
        assert_eq!(headers[header::COOKIE], "a=1");
    }

    #[tokio::test]
    async fn test_noop_refresher() {
        let update = NoopSessionRefresher.refresh(&HeaderMap::new()).await.unwrap();
        assert!(update.is_empty());
    }
}
