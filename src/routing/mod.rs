//! Request classification.
//!
//! # Data Flow
//! ```text
//! Incoming path
//!     → exclusions.rs (bypass / static fast-path / gated)
//!     → matcher.rs (prefix and extension conditions)
//! ```
//!
//! Rules are compiled from config and immutable until the next reload.

pub mod exclusions;
pub mod matcher;

pub use exclusions::Exclusions;
