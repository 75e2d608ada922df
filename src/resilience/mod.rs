//! Resilience subsystem.
//!
//! Every external call on the request path has a deadline. There are no
//! retries: a failed dependency is handled by the caller's fallback.

pub mod timeouts;

pub use timeouts::{with_deadline, Elapsed};
