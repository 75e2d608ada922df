//! Security response headers.
//!
//! Every header is written with `insert`, so applying the bundle twice
//! leaves the same header set as applying it once.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::config::HeadersConfig;

pub const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000; includeSubDomains";
pub const DNS_PREFETCH_CONTROL: &str = "off";

/// Stamps the configured CSP, the extra header bundle, HSTS and
/// `X-DNS-Prefetch-Control` onto responses.
#[derive(Debug, Clone)]
pub struct HeaderAugmenter {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderAugmenter {
    /// Build from config. Entries that are not valid headers are skipped
    /// with a warning; validation rejects them before this point.
    pub fn from_config(config: &HeadersConfig) -> Self {
        let mut headers = Vec::with_capacity(config.extra.len() + 3);

        match HeaderValue::from_str(&config.content_security_policy) {
            Ok(v) => headers.push((header::CONTENT_SECURITY_POLICY, v)),
            Err(_) => tracing::warn!("Ignoring invalid Content-Security-Policy value"),
        }

        for (name, value) in &config.extra {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => headers.push((n, v)),
                _ => tracing::warn!(header = %name, "Ignoring invalid security header"),
            }
        }

        // Fixed headers go last so the bundle cannot override them.
        headers.push((
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
        ));
        headers.push((
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static(DNS_PREFETCH_CONTROL),
        ));

        Self { headers }
    }

    pub fn augment(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

impl Default for HeaderAugmenter {
    fn default() -> Self {
        Self::from_config(&HeadersConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_required_headers() {
        let mut headers = HeaderMap::new();
        HeaderAugmenter::default().augment(&mut headers);

        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], STRICT_TRANSPORT_SECURITY);
        assert_eq!(headers[header::X_DNS_PREFETCH_CONTROL], "off");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[test]
    fn test_idempotent() {
        let augmenter = HeaderAugmenter::default();

        let mut once = HeaderMap::new();
        once.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        augmenter.augment(&mut once);

        let mut twice = once.clone();
        augmenter.augment(&mut twice);

        assert_eq!(once, twice);
        assert_eq!(twice.get_all(header::CONTENT_SECURITY_POLICY).iter().count(), 1);
    }

    #[test]
    fn test_last_write_wins_over_upstream() {
        let mut headers = HeaderMap::new();
        headers.append(header::X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
        headers.append(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));

        HeaderAugmenter::default().augment(&mut headers);
        let values: Vec<_> = headers.get_all(header::X_FRAME_OPTIONS).iter().collect();
        assert_eq!(values, vec!["DENY"]);
    }

    #[test]
    fn test_bundle_cannot_override_hsts() {
        let mut config = HeadersConfig::default();
        config
            .extra
            .insert("Strict-Transport-Security".into(), "max-age=0".into());

        let mut headers = HeaderMap::new();
        HeaderAugmenter::from_config(&config).augment(&mut headers);
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], STRICT_TRANSPORT_SECURITY);
    }
}
