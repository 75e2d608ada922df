//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Gated request:
//!     → client_ip.rs (best-effort client address)
//!     → settings.rs (per-deployment allow-list, defaults on failure)
//!     → access_control.rs (allow-list check)
//!     → patterns.rs (traversal / SQL / script / shell signatures)
//!     → rate_limit.rs (fixed window on sensitive paths)
//!     → session.rs (refresh cookies)
//!     → headers.rs (security response headers)
//!
//! Every denial and internal error → events.rs (audit sink)
//! ```
//!
//! The checks are heuristics in front of the application, not a
//! replacement for authorization and output encoding inside it.

pub mod access_control;
pub mod client_ip;
pub mod clock;
pub mod events;
pub mod headers;
pub mod patterns;
pub mod rate_limit;
pub mod session;
pub mod settings;

pub use access_control::{IpDecision, IpPolicy};
pub use client_ip::resolve_client_ip;
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{AuditSink, SecurityEvent, SecurityEventKind, Severity};
pub use headers::HeaderAugmenter;
pub use patterns::{PatternClass, PatternDetector, ScanOutcome};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use session::{SessionRefresher, SessionUpdate};
pub use settings::{SecuritySettings, SettingsLoader, SettingsStore};
