//! # Middleware
//!
//! The cross-cutting stages every request passes through before it reaches the
//! route-group specific layers (sessions, CSRF, identity, access gate):
//!
//! - `recover`: panic boundary and the single conversion point for server failures
//! - `logging`: per-request span and "received request" line
//! - `headers`: fixed security headers

pub mod headers;
pub mod logging;
pub mod recover;

pub use headers::common_headers;
pub use logging::{log_request, trace_span_logger};
pub use recover::{install_panic_hook, recover_panic};
