//! Security middleware.
//!
//! Currently implemented:
//!
//! - [`CorsMiddleware`]: Cross-Origin Resource Sharing headers and preflight
//!   (`OPTIONS`) short-circuiting.

mod cors;

pub use cors::CorsMiddleware;
