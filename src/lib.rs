//! Edge security gate library.
//!
//! Sits in front of a web application and decides, per request, whether to
//! forward it. See [`gate`] for the pipeline.

pub mod config;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::GateConfig;
pub use gate::EdgeGate;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
