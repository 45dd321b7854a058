//! # canopy
//!
//! A minimalist async HTTP toolkit: route matching, onion-style middleware chains
//! and response merging on top of a small Tokio transport.
//!
//! Every registered entry whose method and path accept a request takes part in
//! it. The matched entries run in registration order as one chain; each handler
//! can answer, delegate to the rest of the chain with `next`, decorate what the
//! inner handlers produced, or fail.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use canopy::{Application, Router, config::ServerConfig, middleware::LoggerMiddleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router
//!         .get("/", |_ctx, _next| Box::pin(async { Ok(Some("Hello, World!".into())) }))
//!         .get("/user/:id", |ctx, _next| {
//!             Box::pin(async move {
//!                 let id = ctx.param("id").unwrap_or_default().to_owned();
//!                 Ok(Some(format!("user {id}").into()))
//!             })
//!         });
//!
//!     let mut app = Application::new();
//!     app.use_middleware(None, LoggerMiddleware)
//!         .use_router(None, &router);
//!     app.listen(ServerConfig::new("127.0.0.1", 8080)).await?;
//!     Ok(())
//! }
//! ```

// ── Transport ─────────────────────────────────────────────────────────────────
pub mod http;
pub mod server;

// ── Dispatch core ─────────────────────────────────────────────────────────────
pub mod app;
pub mod context;
pub mod middleware;
pub mod response;
pub mod router;

// ── Supporting modules ────────────────────────────────────────────────────────
pub mod config;
pub mod cookie;
pub mod error;
pub mod security;
pub mod static_files;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use app::Application;
pub use context::Context;
pub use error::{Error, HttpError, Result};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Next};
pub use response::{Body, HttpResponse};
pub use router::Router;
pub use server::{Server, ServerError};
