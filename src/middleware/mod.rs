//! Middleware pipeline: an ordered, cancellable chain of handlers with
//! onion-style delegation.
//!
//! Every matched route entry contributes one [`Middleware`]. The chain runs them
//! outer to inner: a handler runs its own code, optionally calls
//! [`Next::run`] to execute the rest of the chain, then resumes once the inner
//! handlers are done. A handler may also return without calling `next`, which
//! short-circuits everything after it.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by every handler.
//! - [`Next`]: cursor into the remaining chain.
//! - [`Chain`] and [`combine`]: the chain built for one request.
//! - [`from_fn`]: turns an async closure into a [`Middleware`].
//! - [`LoggerMiddleware`]: built-in request logger.
//!
//! ## Results
//!
//! A handler resolves to [`MiddlewareResult`]:
//!
//! - `Ok(Some(response))` is merged into the context's accumulated response.
//! - `Ok(None)` leaves the accumulator as the handler (and the inner chain) left it.
//! - `Err(Error::Http(_))` is rendered by the error handler at this step.
//! - any other `Err` aborts the chain.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::time::Instant;

use crate::context::Context;
use crate::error::{Error, ErrorHandler, Result};
use crate::response::HttpResponse;
use crate::router::RouteEntry;

/// A boxed, `Send` future borrowing from the request context.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler resolves to.
pub type MiddlewareResult = Result<Option<HttpResponse>>;

/// The core trait for all canopy handlers.
///
/// Implementations receive the request [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await?` and return `Ok(None)`.
/// - **Short-circuit**: return a response without calling `next`.
/// - **Decorate**: call `next.run(ctx).await?`, then adjust `ctx.response_mut()`.
///
/// Middleware is shared across Tokio tasks, so it must be `Send + Sync`.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult>;
}

/// A [`Middleware`] built from a closure. See [`from_fn`].
pub struct FromFn<F> {
    f: F,
}

/// Wraps an async closure as a [`Middleware`].
///
/// ```rust
/// use canopy::middleware::from_fn;
///
/// let stamp = from_fn(|ctx, next| {
///     Box::pin(async move {
///         next.run(ctx).await?;
///         ctx.response_mut().headers_mut().insert("X-Powered-By", "canopy");
///         Ok(None)
///     })
/// });
/// # let _ = stamp;
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
{
    FromFn { f }
}

impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        (self.f)(ctx, next)
    }
}

/// The handlers matched for one request, ready to run.
///
/// The cursor only ever moves forward. Re-entering a position that has already
/// been reached (calling `next` twice, or calling an outer `next` after an inner
/// one) fails with [`Error::NextCalledTwice`].
pub struct Chain {
    path: String,
    entries: Vec<RouteEntry>,
    error_handler: ErrorHandler,
    // Deepest position entered so far, 1-based; 0 before the chain starts.
    reached: AtomicUsize,
}

/// Builds the chain for `path` from the entries that matched it, in
/// registration order. Typed HTTP errors are rendered with `error_handler`.
pub fn combine(path: impl Into<String>, entries: Vec<RouteEntry>, error_handler: ErrorHandler) -> Chain {
    Chain {
        path: path.into(),
        entries,
        error_handler,
        reached: AtomicUsize::new(0),
    }
}

impl Chain {
    /// Runs the chain from its first entry.
    ///
    /// # Errors
    ///
    /// Any error other than [`Error::Http`] raised by a handler, including
    /// [`Error::NextCalledTwice`].
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.step(0, ctx).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn step<'a>(&'a self, index: usize, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let position = index + 1;
            if self.reached.fetch_max(position, Ordering::AcqRel) >= position {
                return Err(Error::NextCalledTwice);
            }

            let Some(entry) = self.entries.get(index) else {
                return Ok(());
            };

            ctx.set_params(entry.params(&self.path));
            let next = Next {
                chain: self,
                index: index + 1,
            };

            let returned = match entry.middleware().handle(&mut *ctx, next).await {
                Ok(returned) => returned,
                Err(Error::Http(error)) => Some((self.error_handler)(ctx, &error)),
                Err(error) => return Err(error),
            };

            if let Some(response) = returned {
                ctx.response_mut().merge(response, entry.defaults());
            }
            Ok(())
        })
    }
}

/// A cursor into the remaining chain, handed to each [`Middleware::handle`] call.
///
/// # Examples
///
/// ```rust
/// use canopy::{context::Context, middleware::{BoxFuture, Middleware, MiddlewareResult, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
///         Box::pin(async move {
///             next.run(ctx).await?;
///             Ok(None)
///         })
///     }
/// }
/// ```
pub struct Next<'a> {
    chain: &'a Chain,
    index: usize,
}

impl Next<'_> {
    /// Runs the rest of the chain against `ctx`.
    ///
    /// Path parameters are rebound for each inner entry, so after this returns
    /// `ctx.params()` reflects the innermost entry that ran.
    ///
    /// # Errors
    ///
    /// [`Error::NextCalledTwice`] when called more than once, or once the chain
    /// has already advanced past this point; otherwise whatever fatal error an
    /// inner handler raised.
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.chain.step(self.index, ctx).await
    }
}

/// Built-in middleware that logs each request's method, path, status and duration.
///
/// Emits a single `tracing::info!` line after the inner chain completes:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// # Examples
///
/// ```rust,no_run
/// use canopy::{Application, middleware::LoggerMiddleware};
///
/// let mut app = Application::new();
/// app.use_middleware(None, LoggerMiddleware);
/// ```
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.method().to_string();
            let path = ctx.path().to_owned();

            next.run(ctx).await?;

            let status = ctx.response().status().as_u16();
            tracing::info!("{} {} - {} ({:?})", method, path, status, start.elapsed());
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::{HttpError, default_error_handler};
    use crate::http::{Method, Request, StatusCode};
    use crate::response::content_type;
    use crate::router::Router;

    type Log = Arc<Mutex<Vec<String>>>;

    fn error_handler() -> ErrorHandler {
        Arc::new(default_error_handler)
    }

    fn context(method: Method, path: &str) -> Context {
        Context::new(Request::new(method, path), None)
    }

    fn chain_for(router: &Router, method: &Method, path: &str) -> Chain {
        let matched = router
            .entries()
            .into_iter()
            .filter(|entry| entry.matches(path, method))
            .collect();
        combine(path, matched, error_handler())
    }

    fn push(log: &Log, line: impl Into<String>) {
        log.lock().unwrap().push(line.into());
    }

    fn recorded(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn onion_ordering() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        for name in ["A", "B", "C"] {
            let log = log.clone();
            router.all("*", move |ctx, next| {
                let log = log.clone();
                Box::pin(async move {
                    push(&log, format!("pre {name}"));
                    next.run(ctx).await?;
                    push(&log, format!("post {name}"));
                    Ok(None)
                })
            });
        }

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(
            recorded(&log),
            vec!["pre A", "pre B", "pre C", "post C", "post B", "post A"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_entries() {
        let log: Log = Arc::default();
        let inner_log = log.clone();
        let mut router = Router::new();
        router
            .all("*", |_ctx, _next| Box::pin(async { Ok(Some("blocked".into())) }))
            .get("/", move |_ctx, _next| {
                let log = inner_log.clone();
                Box::pin(async move {
                    push(&log, "inner");
                    Ok(None)
                })
            });

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert!(recorded(&log).is_empty());
        assert_eq!(ctx.response().body().as_text(), Some("blocked"));
    }

    #[tokio::test]
    async fn exhausted_chain_leaves_response_unchanged() {
        let mut router = Router::new();
        router.all("*", |ctx, next| {
            Box::pin(async move {
                ctx.response_mut().set_body("kept");
                next.run(ctx).await?;
                Ok(None)
            })
        });

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().body().as_text(), Some("kept"));
    }

    // ── next() guard ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn next_called_twice_fails_on_second_call() {
        let log: Log = Arc::default();
        let handler_log = log.clone();
        let mut router = Router::new();
        router
            .all("*", move |ctx, next| {
                let log = handler_log.clone();
                Box::pin(async move {
                    next.run(ctx).await?;
                    push(&log, "first ok");
                    next.run(ctx).await?;
                    push(&log, "second ok");
                    Ok(None)
                })
            })
            .get("/", |_ctx, _next| Box::pin(async { Ok(Some("leaf".into())) }));

        let mut ctx = context(Method::Get, "/");
        let err = chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::NextCalledTwice));
        assert_eq!(recorded(&log), vec!["first ok"]);
    }

    #[tokio::test]
    async fn next_called_twice_at_end_of_chain() {
        let mut router = Router::new();
        router.get("/", |ctx, next| {
            Box::pin(async move {
                next.run(ctx).await?;
                next.run(ctx).await?;
                Ok(None)
            })
        });

        let mut ctx = context(Method::Get, "/");
        let err = chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::NextCalledTwice));
    }

    // ── errors ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn http_error_is_rendered_at_its_step() {
        let seen: Log = Arc::default();
        let outer_seen = seen.clone();
        let mut router = Router::new();
        router
            .all("*", move |ctx, next| {
                let seen = outer_seen.clone();
                Box::pin(async move {
                    next.run(ctx).await?;
                    push(&seen, ctx.response().status().as_u16().to_string());
                    Ok(None)
                })
            })
            .get("/", |_ctx, _next| {
                Box::pin(async { Err(HttpError::forbidden("members only").into()) })
            });

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(recorded(&seen), vec!["403"]);
        assert_eq!(ctx.response().content_type(), Some(content_type::HTML));
        let page = ctx.response().body().as_text().unwrap_or_default();
        assert!(page.contains("Error 403: members only"));
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let mut router = Router::new();
        router
            .all("*", |ctx, next| {
                Box::pin(async move {
                    next.run(ctx).await?;
                    Ok(Some("unreachable".into()))
                })
            })
            .get("/", |_ctx, _next| Box::pin(async { Err(Error::handler("boom")) }));

        let mut ctx = context(Method::Get, "/");
        let err = chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
        assert!(ctx.response().body().is_falsy());
    }

    // ── merging ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn handler_content_type_beats_defaults() {
        let mut router = Router::new();
        router.get("/", |_ctx, _next| {
            Box::pin(async { Ok(Some(HttpResponse::from("{}").with_type(content_type::JSON))) })
        });

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().content_type(), Some(content_type::JSON));
    }

    #[tokio::test]
    async fn defaults_fill_missing_type_and_status() {
        let mut router = Router::new();
        router.get("/", |_ctx, _next| Box::pin(async { Ok(Some("hi".into())) }));

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().content_type(), Some(content_type::PLAIN));
        assert_eq!(ctx.response().status_opt(), Some(StatusCode::Ok));
    }

    #[tokio::test]
    async fn inner_headers_win_over_outer() {
        let mut router = Router::new();
        router
            .all("*", |ctx, next| {
                Box::pin(async move {
                    next.run(ctx).await?;
                    Ok(Some(HttpResponse::from("outer").with_header("X-Layer", "outer")))
                })
            })
            .get("/", |_ctx, _next| {
                Box::pin(async { Ok(Some(HttpResponse::from("inner").with_header("X-Inner", "1"))) })
            });

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        let res = ctx.response();
        assert_eq!(res.body().as_text(), Some("outer"));
        assert_eq!(res.headers().get("x-layer"), Some("outer"));
        assert_eq!(res.headers().get("x-inner"), Some("1"));
    }

    // ── parameters ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn params_are_rebound_for_each_entry() {
        let seen: Log = Arc::default();
        let outer_seen = seen.clone();
        let inner_seen = seen.clone();
        let mut router = Router::new();
        router
            .all("*", move |ctx, next| {
                let seen = outer_seen.clone();
                Box::pin(async move {
                    push(&seen, format!("outer before: {:?}", ctx.param("id")));
                    next.run(ctx).await?;
                    push(&seen, format!("outer after: {:?}", ctx.param("id")));
                    Ok(None)
                })
            })
            .get("/user/:id", move |ctx, _next| {
                let seen = inner_seen.clone();
                Box::pin(async move {
                    push(&seen, format!("inner: {:?}", ctx.param("id")));
                    Ok(Some("user".into()))
                })
            });

        let mut ctx = context(Method::Get, "/user/7");
        chain_for(&router, &Method::Get, "/user/7").run(&mut ctx).await.unwrap();
        assert_eq!(
            recorded(&seen),
            vec![
                "outer before: None",
                "inner: Some(\"7\")",
                "outer after: Some(\"7\")",
            ]
        );
    }

    // ── LoggerMiddleware ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn logger_passes_through() {
        let mut router = Router::new();
        router
            .route(&[], "*", LoggerMiddleware)
            .get("/", |_ctx, _next| Box::pin(async { Ok(Some("hello".into())) }));

        let mut ctx = context(Method::Get, "/");
        chain_for(&router, &Method::Get, "/").run(&mut ctx).await.unwrap();
        assert_eq!(ctx.response().body().as_text(), Some("hello"));
    }
}
