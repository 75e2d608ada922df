//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → shared via Arc to the gate and server
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the gate's runtime state
//! ```
//!
//! All fields have defaults, so an empty file is a valid config.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccessConfig, AuditConfig, AuditKind, EmptyAllowlistPolicy, ExclusionConfig, GateConfig,
    HeadersConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig,
    SessionConfig, SessionKind, SettingsStoreConfig, SettingsStoreKind, TimeoutConfig,
    UpstreamConfig,
};
