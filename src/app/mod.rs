//! The dispatcher: owns the route entries and turns one request into one response.
//!
//! For each request [`Application::handle`] builds a fresh [`Context`], collects
//! every entry that matches the request, runs them as a single chain and converts
//! the accumulated [`HttpResponse`] into a wire [`Response`]. It never fails:
//! a miss becomes the error handler's `404` and any fatal error its `500`.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::{AppConfig, ServerConfig};
use crate::context::Context;
use crate::error::{Error, ErrorHandler, HttpError, Result, default_error_handler};
use crate::http::{Request, Response};
use crate::middleware::{Middleware, combine};
use crate::response::{HttpResponse, RouteDefaults};
use crate::router::{RouteEntry, Router};
use crate::server::{Server, ServerError};

/// An application: middleware, mounted routers and an error handler.
///
/// # Examples
///
/// ```rust,no_run
/// use canopy::{Application, Router, config::ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", |_ctx, _next| Box::pin(async { Ok(Some("hello".into())) }));
///
///     let mut app = Application::new();
///     app.use_router(None, &router);
///     app.listen(ServerConfig::new("127.0.0.1", 8080)).await?;
///     Ok(())
/// }
/// ```
pub struct Application {
    routes: Router,
    error_handler: ErrorHandler,
    config: AppConfig,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            routes: Router::with_defaults(RouteDefaults::none()),
            error_handler: Arc::new(default_error_handler),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs `middleware` for every request below `path` (every request when `None`).
    ///
    /// ```rust
    /// use canopy::{Application, middleware::from_fn};
    ///
    /// let mut app = Application::new();
    /// app.use_middleware(Some("/api"), from_fn(|ctx, next| {
    ///     Box::pin(async move {
    ///         next.run(ctx).await?;
    ///         ctx.response_mut().headers_mut().insert("X-Api", "1");
    ///         Ok(None)
    ///     })
    /// }));
    /// ```
    pub fn use_middleware(&mut self, path: Option<&str>, middleware: impl Middleware + 'static) -> &mut Self {
        let entry = RouteEntry::wildcard(Arc::new(middleware), RouteDefaults::none())
            .with_root(path.unwrap_or("/"));
        self.routes.push(entry);
        self
    }

    /// Mounts a copy of `router`'s entries, re-rooted under `prefix` when given.
    pub fn use_router(&mut self, prefix: Option<&str>, router: &Router) -> &mut Self {
        self.routes.mount(prefix, router);
        self
    }

    /// Replaces the handler that renders typed HTTP errors.
    pub fn handle_errors<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&Context, &HttpError) -> HttpResponse + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// A copy of the registered entries, in registration order.
    pub fn entries(&self) -> Vec<RouteEntry> {
        self.routes.entries()
    }

    /// Dispatches one request.
    ///
    /// Always produces a response; failures are rendered through the error handler.
    pub async fn handle(&self, request: Request, remote: Option<SocketAddr>) -> Response {
        let mut ctx = Context::new(request, remote);
        if self.config.logging {
            info!(
                remote = ?remote,
                method = %ctx.method(),
                url = %ctx.request().url(),
                "Request"
            );
        }

        let response = match self.dispatch(&mut ctx).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, method = %ctx.method(), path = %ctx.path(), "request failed");
                (self.error_handler)(&ctx, &HttpError::internal("Internal server error"))
            }
        };

        if self.config.logging {
            info!("{}", response_log(&response));
        }
        response.transform()
    }

    async fn dispatch(&self, ctx: &mut Context) -> Result<HttpResponse> {
        if self.routes.is_empty() {
            return Err(Error::NoRoutes);
        }

        let path = ctx.path().to_owned();
        let matched: Vec<RouteEntry> = self
            .routes
            .iter()
            .filter(|entry| entry.matches(&path, ctx.method()))
            .cloned()
            .collect();
        debug!(path = %path, matched = matched.len(), "matched route entries");

        if !matched.is_empty() {
            combine(path, matched, Arc::clone(&self.error_handler))
                .run(ctx)
                .await?;
            let mut response = ctx.take_response();
            response.apply_cookies(ctx.cookies());
            if !response.is_empty() {
                return Ok(response);
            }
        }

        Ok((self.error_handler)(ctx, &HttpError::not_found("The page was not found")))
    }

    /// Binds to `config` and serves requests until the listener fails.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address cannot be bound, [`ServerError::Io`]
    /// when the listener fails.
    pub async fn listen(self, config: ServerConfig) -> Result<(), ServerError> {
        let server = Server::bind(config.address()).await?;
        if self.config.logging {
            info!("Starting an HTTP server at http://{}", server.local_addr());
        }

        let app = Arc::new(self);
        server
            .run(move |request, peer| {
                let app = Arc::clone(&app);
                async move { app.handle(request, Some(peer)).await }
            })
            .await
    }
}

// `Response: 404 ERROR`
fn response_log(response: &HttpResponse) -> String {
    let status = response.status();
    let outcome = if status.is_error() { "ERROR" } else { "OK" };
    format!("Response: {} {}", status.as_u16(), outcome)
}
