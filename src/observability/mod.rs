//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate and server produce:
//!     → logging.rs (structured log events, incl. the security_audit target)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
