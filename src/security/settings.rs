//! Per-deployment security settings.
//!
//! The settings document lives in an external data store, in the
//! `settings.security` field of the oldest deployment row. It is read on
//! every gated request. Any failure (transport, missing row, schema
//! mismatch, deadline) degrades to [`SecuritySettings::default`], which
//! disables the allow-list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SettingsStoreConfig;
use crate::observability::metrics;
use crate::resilience::{with_deadline, Elapsed};

/// Validated security settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySettings {
    pub access: AccessSettings,
}

/// IP allow-list settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessSettings {
    pub ip_whitelist_enabled: bool,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("settings store returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("settings store returned no rows")]
    MissingRow,

    #[error("settings store URL is invalid: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("security settings failed validation: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("settings store {0}")]
    TimedOut(#[from] Elapsed),
}

/// Source of the raw `settings.security` document.
///
/// `Value::Null` means the row exists but carries no security section.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch(&self) -> Result<Value, SettingsError>;
}

/// Serves a fixed document.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsStore {
    document: Value,
}

impl StaticSettingsStore {
    pub fn new(document: Value) -> Self {
        Self { document }
    }
}

#[async_trait]
impl SettingsStore for StaticSettingsStore {
    async fn fetch(&self) -> Result<Value, SettingsError> {
        Ok(self.document.clone())
    }
}

/// Reads the settings row from a PostgREST-compatible endpoint.
///
/// Issues `GET {base}/rest/v1/{table}?select={column}&order=created_at.asc&limit=1`.
#[derive(Debug, Clone)]
pub struct RestSettingsStore {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
    column: String,
}

impl RestSettingsStore {
    pub fn new(client: reqwest::Client, config: &SettingsStoreConfig) -> Result<Self, SettingsError> {
        let base = config.base_url.trim_end_matches('/');
        let mut endpoint = url::Url::parse(&format!("{}/rest/v1/{}", base, config.table))?;
        endpoint
            .query_pairs_mut()
            .append_pair("select", &config.column)
            .append_pair("order", "created_at.asc")
            .append_pair("limit", "1");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            column: config.column.clone(),
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl SettingsStore for RestSettingsStore {
    async fn fetch(&self) -> Result<Value, SettingsError> {
        let res = self
            .client
            .get(self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(SettingsError::Status(res.status()));
        }

        let rows: Vec<Value> = res.json().await?;
        extract_security(rows, &self.column)
    }
}

fn extract_security(rows: Vec<Value>, column: &str) -> Result<Value, SettingsError> {
    let row = rows.into_iter().next().ok_or(SettingsError::MissingRow)?;
    Ok(row
        .get(column)
        .and_then(|settings| settings.get("security"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Validate a raw security document, defaulting every absent field.
pub fn parse_security_settings(raw: Value) -> Result<SecuritySettings, SettingsError> {
    if raw.is_null() {
        return Ok(SecuritySettings::default());
    }
    Ok(serde_json::from_value(raw)?)
}

/// Fetches and validates settings under a deadline, never failing.
#[derive(Clone)]
pub struct SettingsLoader {
    store: Arc<dyn SettingsStore>,
    timeout: Duration,
}

impl SettingsLoader {
    pub fn new(store: Arc<dyn SettingsStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Load the current settings, substituting defaults on any failure.
    pub async fn load(&self) -> SecuritySettings {
        match self.try_load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load security settings, using defaults");
                metrics::record_settings_fallback();
                SecuritySettings::default()
            }
        }
    }

    pub async fn try_load(&self) -> Result<SecuritySettings, SettingsError> {
        let raw = with_deadline(self.timeout, self.store.fetch()).await??;
        parse_security_settings(raw)
    }
}
