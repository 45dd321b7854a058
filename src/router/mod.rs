//! Route registry: an ordered list of route entries and the predicate that
//! decides which of them apply to a request.
//!
//! Unlike a first-match router, every entry whose method and path accept the
//! request takes part in it. The matched entries run as one middleware chain in
//! registration order, so order is significant.
//!
//! | Path                 | Example match              | Params                |
//! |----------------------|----------------------------|-----------------------|
//! | `/users`             | `/users`, `/USERS/`        | *(none)*              |
//! | `/users/:id`         | `/users/42`                | `id → "42"`           |
//! | `/files/:path*`      | `/files/docs/readme.txt`   | `path → "docs/readme.txt"` |
//! | `*`                  | anything                   | *(none)*              |
//! | `Regex`              | whatever the regex accepts | *(none)*              |
//!
//! Routers can be mounted into one another (and into an application) under a
//! prefix; mounting rewrites the root of the copied entries.

mod matcher;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

pub use matcher::{PathMatcher, normalize_path};

use crate::context::{Context, Parameters};
use crate::error::Result;
use crate::http::Method;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next, from_fn};
use crate::response::RouteDefaults;
use crate::static_files::StaticFiles;

/// The path an entry is registered under.
#[derive(Debug, Clone)]
pub enum RoutePath {
    /// A route pattern, or `*` for every path.
    Pattern(String),
    /// A raw regular expression, tested against the path relative to the root.
    Regex(Regex),
}

impl RoutePath {
    fn is_wildcard(&self) -> bool {
        matches!(self, RoutePath::Pattern(p) if p == "*")
    }
}

impl From<&str> for RoutePath {
    fn from(pattern: &str) -> Self {
        RoutePath::Pattern(pattern.to_owned())
    }
}

impl From<String> for RoutePath {
    fn from(pattern: String) -> Self {
        RoutePath::Pattern(pattern)
    }
}

impl From<Regex> for RoutePath {
    fn from(regex: Regex) -> Self {
        RoutePath::Regex(regex)
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutePath::Pattern(pattern) => f.write_str(pattern),
            RoutePath::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// One registered handler and the conditions under which it runs.
///
/// Entries are cheap to clone: the handler and the compiled matcher sit
/// behind `Arc`s.
#[derive(Clone)]
pub struct RouteEntry {
    methods: Vec<Method>,
    path: RoutePath,
    matcher: Option<Arc<PathMatcher>>,
    root: String,
    is_static: bool,
    middleware: Arc<dyn Middleware>,
    defaults: RouteDefaults,
}

impl RouteEntry {
    /// Builds an entry rooted at `/`. Patterns are normalized and compiled here.
    ///
    /// An empty `methods` list accepts every method.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`](crate::Error::InvalidPattern) when the pattern
    /// does not compile.
    pub fn new(
        methods: Vec<Method>,
        path: RoutePath,
        middleware: Arc<dyn Middleware>,
        is_static: bool,
        defaults: RouteDefaults,
    ) -> Result<Self> {
        let path = match path {
            RoutePath::Pattern(pattern) => RoutePath::Pattern(normalize_path(&pattern)),
            regex => regex,
        };
        let matcher = match &path {
            RoutePath::Pattern(pattern) if pattern != "*" && !is_static => {
                Some(Arc::new(PathMatcher::compile(pattern)?))
            }
            _ => None,
        };

        Ok(Self {
            methods,
            path,
            matcher,
            root: "/".to_owned(),
            is_static,
            middleware,
            defaults,
        })
    }

    /// An entry on `*` for every method, as registered by
    /// [`Application::use_middleware`](crate::Application::use_middleware).
    pub fn wildcard(middleware: Arc<dyn Middleware>, defaults: RouteDefaults) -> Self {
        Self {
            methods: Vec::new(),
            path: RoutePath::Pattern("*".to_owned()),
            matcher: None,
            root: "/".to_owned(),
            is_static: false,
            middleware,
            defaults,
        }
    }

    /// Re-roots the entry under `root`.
    #[must_use]
    pub fn with_root(mut self, root: &str) -> Self {
        self.root = normalize_path(root);
        self
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn path(&self) -> &RoutePath {
        &self.path
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }

    pub fn defaults(&self) -> &RouteDefaults {
        &self.defaults
    }

    // `path` below the root, normalized.
    fn relative_path(&self, path: &str) -> String {
        if self.root == "/" {
            return path.to_owned();
        }
        normalize_path(path.strip_prefix(self.root.as_str()).unwrap_or(path))
    }

    /// Whether this entry takes part in a `method` request for `path`.
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(method) {
            return false;
        }
        if !path.starts_with(self.root.as_str()) {
            return false;
        }

        let relative = self.relative_path(path);
        let pattern = match &self.path {
            RoutePath::Regex(regex) => return regex.is_match(&relative),
            RoutePath::Pattern(pattern) => pattern,
        };

        if pattern == "*" || (pattern == "/" && relative == "/") {
            return true;
        }
        if self.is_static {
            return path.starts_with(pattern.as_str());
        }
        self.matcher
            .as_ref()
            .is_some_and(|matcher| matcher.matches(&relative).is_some())
    }

    /// The parameters this entry extracts from `path`. Wildcard, regex and
    /// static entries never extract any.
    pub fn params(&self, path: &str) -> Parameters {
        if self.is_static || self.path.is_wildcard() {
            return Parameters::new();
        }
        self.matcher
            .as_ref()
            .and_then(|matcher| matcher.matches(&self.relative_path(path)))
            .unwrap_or_default()
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("methods", &self.methods)
            .field("path", &self.path)
            .field("root", &self.root)
            .field("is_static", &self.is_static)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// An ordered collection of route entries.
///
/// Each registration call appends exactly one entry. Register several handlers
/// for one path by calling the method again; they run in order, each able to
/// delegate to the next.
///
/// # Examples
///
/// ```rust
/// use canopy::Router;
///
/// let mut router = Router::new();
/// router
///     .get("/ping", |_ctx, _next| Box::pin(async { Ok(Some("pong".into())) }))
///     .get("/users/:id", |ctx, _next| {
///         Box::pin(async move {
///             let id = ctx.param("id").unwrap_or("unknown").to_owned();
///             Ok(Some(id.into()))
///         })
///     });
/// assert_eq!(router.len(), 2);
/// ```
///
/// # Panics
///
/// The registration helpers panic when a pattern does not compile. Use
/// [`Router::try_route`] to handle that case instead.
pub struct Router {
    entries: Vec<RouteEntry>,
    defaults: RouteDefaults,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router whose entries default to a `200` plain-text response.
    ///
    /// ```rust
    /// use canopy::Router;
    ///
    /// assert!(Router::new().is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_defaults(RouteDefaults::plain_text())
    }

    /// Creates an empty router whose entries use `defaults` to fill in what a
    /// handler's response leaves unset.
    pub fn with_defaults(defaults: RouteDefaults) -> Self {
        Self {
            entries: Vec::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &RouteDefaults {
        &self.defaults
    }

    /// Registers `middleware` for `methods` (empty for any) on `path`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPattern`](crate::Error::InvalidPattern) when `path` does
    /// not compile.
    pub fn try_route(
        &mut self,
        methods: &[Method],
        path: impl Into<RoutePath>,
        middleware: impl Middleware + 'static,
    ) -> Result<&mut Self> {
        self.register(methods.to_vec(), path.into(), Arc::new(middleware), false)
    }

    /// Infallible form of [`try_route`](Self::try_route).
    ///
    /// ```rust
    /// use canopy::{Router, http::Method, middleware::LoggerMiddleware};
    ///
    /// let mut router = Router::new();
    /// router.route(&[Method::Get, Method::Head], "*", LoggerMiddleware);
    /// ```
    pub fn route(
        &mut self,
        methods: &[Method],
        path: impl Into<RoutePath>,
        middleware: impl Middleware + 'static,
    ) -> &mut Self {
        match self.try_route(methods, path, middleware) {
            Ok(router) => router,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn get<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Get], path, from_fn(handler))
    }

    pub fn post<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Post], path, from_fn(handler))
    }

    pub fn put<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Put], path, from_fn(handler))
    }

    pub fn patch<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Patch], path, from_fn(handler))
    }

    pub fn delete<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Delete], path, from_fn(handler))
    }

    pub fn head<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Head], path, from_fn(handler))
    }

    pub fn options<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Options], path, from_fn(handler))
    }

    pub fn connect<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[Method::Connect], path, from_fn(handler))
    }

    /// Registers `handler` for every method.
    pub fn all<H>(&mut self, path: impl Into<RoutePath>, handler: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
    {
        self.route(&[], path, from_fn(handler))
    }

    /// Serves files from `dir` for every `GET` below `mount`.
    ///
    /// ```rust,no_run
    /// use canopy::Router;
    ///
    /// let mut router = Router::new();
    /// router.serve_static("/assets", "./public");
    /// ```
    pub fn serve_static(&mut self, mount: &str, dir: impl Into<PathBuf>) -> &mut Self {
        let files = StaticFiles::new(mount, dir);
        match self.register(vec![Method::Get], mount.into(), Arc::new(files), true) {
            Ok(router) => router,
            Err(e) => panic!("{e}"),
        }
    }

    fn register(
        &mut self,
        methods: Vec<Method>,
        path: RoutePath,
        middleware: Arc<dyn Middleware>,
        is_static: bool,
    ) -> Result<&mut Self> {
        let entry = RouteEntry::new(methods, path, middleware, is_static, self.defaults.clone())?;
        self.entries.push(entry);
        Ok(self)
    }

    /// Copies `other`'s entries onto the end of this router.
    ///
    /// With a prefix every copied entry is re-rooted there; without one each
    /// entry keeps its own root.
    pub fn mount(&mut self, prefix: Option<&str>, other: &Router) -> &mut Self {
        self.entries.extend(other.entries.iter().map(|entry| match prefix {
            Some(prefix) => entry.clone().with_root(prefix),
            None => entry.clone(),
        }));
        self
    }

    pub(crate) fn push(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    /// A copy of the registered entries, in registration order.
    pub fn entries(&self) -> Vec<RouteEntry> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::response::content_type;

    fn noop(router: &mut Router, methods: &[Method], path: &str) {
        router.route(
            methods,
            path,
            from_fn(|_ctx, _next| Box::pin(async { Ok(None) })),
        );
    }

    fn single(methods: &[Method], path: &str) -> RouteEntry {
        let mut router = Router::new();
        noop(&mut router, methods, path);
        router.entries().remove(0)
    }

    // ── RouteEntry::matches ───────────────────────────────────────────────────

    #[test]
    fn method_filtering() {
        let entry = single(&[Method::Get], "/users");
        assert!(entry.matches("/users", &Method::Get));
        assert!(!entry.matches("/users", &Method::Post));
        assert!(!entry.matches("/users", &Method::Head));
    }

    #[test]
    fn empty_method_set_accepts_any() {
        let entry = single(&[], "/users");
        for method in [Method::Get, Method::Post, Method::Custom("PURGE".into())] {
            assert!(entry.matches("/users", &method));
        }
    }

    #[test]
    fn wildcard_entry_under_root() {
        let entry = RouteEntry::wildcard(
            Arc::new(from_fn(|_ctx, _next| Box::pin(async { Ok(None) }))),
            RouteDefaults::none(),
        )
        .with_root("/admin/");
        assert!(entry.matches("/admin/users", &Method::Post));
        assert!(!entry.matches("/public", &Method::Get));
    }

    #[test]
    fn wildcard_matches_everything() {
        let entry = single(&[], "*");
        assert!(entry.matches("/", &Method::Get));
        assert!(entry.matches("/deep/nested/path", &Method::Delete));
        assert!(entry.params("/deep/nested/path").is_empty());
    }

    #[test]
    fn root_pattern_only_matches_root() {
        let entry = single(&[Method::Get], "/");
        assert!(entry.matches("/", &Method::Get));
        assert!(!entry.matches("/other", &Method::Get));
    }

    #[test]
    fn pattern_params() {
        let entry = single(&[Method::Get], "/user/:id");
        assert!(entry.matches("/user/7", &Method::Get));
        assert!(!entry.matches("/user", &Method::Get));
        assert_eq!(entry.params("/user/7").get("id"), Some("7"));
    }

    #[test]
    fn regex_paths_match_without_params() {
        let mut router = Router::new();
        router.get(Regex::new(r"^/v\d+/status$").unwrap(), |_ctx, _next| {
            Box::pin(async { Ok(None) })
        });
        let entry = router.entries().remove(0);
        assert!(entry.matches("/v2/status", &Method::Get));
        assert!(!entry.matches("/vx/status", &Method::Get));
        assert!(entry.params("/v2/status").is_empty());
    }

    #[test]
    fn static_entries_match_by_prefix() {
        let mut router = Router::new();
        router.serve_static("/assets", "/srv/www");
        let entry = router.entries().remove(0);
        assert!(entry.is_static());
        assert!(entry.matches("/assets/css/site.css", &Method::Get));
        assert!(entry.matches("/assets", &Method::Get));
        assert!(!entry.matches("/other/site.css", &Method::Get));
        assert!(!entry.matches("/assets/site.css", &Method::Post));
    }

    #[test]
    fn patterns_are_normalized_on_registration() {
        let entry = single(&[Method::Get], "users//list/");
        assert!(matches!(entry.path(), RoutePath::Pattern(p) if p == "/users/list"));
        assert!(entry.matches("/users/list", &Method::Get));
    }

    // ── mounting ──────────────────────────────────────────────────────────────

    #[test]
    fn mount_with_prefix_rewrites_root() {
        let mut api = Router::new();
        noop(&mut api, &[Method::Get], "/user/:id");

        let mut app = Router::new();
        app.mount(Some("api/"), &api);

        let entry = &app.entries()[0];
        assert_eq!(entry.root(), "/api");
        assert!(entry.matches("/api/user/7", &Method::Get));
        assert!(!entry.matches("/user/7", &Method::Get));
        assert_eq!(entry.params("/api/user/7").get("id"), Some("7"));
    }

    #[test]
    fn mounted_root_pattern_matches_bare_prefix() {
        let mut api = Router::new();
        noop(&mut api, &[Method::Get], "/");

        let mut app = Router::new();
        app.mount(Some("/api"), &api);

        let entry = &app.entries()[0];
        assert!(entry.matches("/api", &Method::Get));
        assert!(entry.matches("/api/", &Method::Get));
        assert!(!entry.matches("/api/x", &Method::Get));
    }

    #[test]
    fn mount_without_prefix_keeps_roots() {
        let mut inner = Router::new();
        noop(&mut inner, &[Method::Get], "/a");
        let mut middle = Router::new();
        middle.mount(Some("/v1"), &inner);
        noop(&mut middle, &[Method::Get], "/b");

        let mut outer = Router::new();
        outer.mount(None, &middle);

        let roots: Vec<String> = outer.entries().iter().map(|e| e.root().to_owned()).collect();
        assert_eq!(roots, vec!["/v1", "/"]);
    }

    // ── registration ──────────────────────────────────────────────────────────

    #[test]
    fn registration_order_is_preserved() {
        let mut router = Router::new();
        noop(&mut router, &[Method::Get], "/a");
        noop(&mut router, &[Method::Get], "/b");
        noop(&mut router, &[Method::Get], "/c");
        let paths: Vec<String> = router.entries().iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn every_verb_helper_registers_its_method() {
        let mut router = Router::new();
        router
            .get("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .post("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .put("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .patch("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .delete("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .head("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .options("/r", |_ctx, _next| Box::pin(async { Ok(None) }))
            .connect("/r", |_ctx, _next| Box::pin(async { Ok(None) }));

        let methods: Vec<Method> = router
            .entries()
            .iter()
            .flat_map(|e| e.methods().to_vec())
            .collect();
        assert_eq!(
            methods,
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Patch,
                Method::Delete,
                Method::Head,
                Method::Options,
                Method::Connect,
            ]
        );
    }

    #[test]
    fn entries_are_a_copy() {
        let mut router = Router::new();
        noop(&mut router, &[Method::Get], "/a");
        let mut copy = router.entries();
        copy.clear();
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn defaults_are_attached_to_entries() {
        let entry = single(&[Method::Get], "/");
        assert_eq!(entry.defaults().status, Some(StatusCode::Ok));
        assert_eq!(entry.defaults().content_type.as_deref(), Some(content_type::PLAIN));

        let mut router = Router::with_defaults(RouteDefaults::none().with_type(content_type::JSON));
        noop(&mut router, &[Method::Get], "/");
        let entry = router.entries().remove(0);
        assert_eq!(entry.defaults().content_type.as_deref(), Some(content_type::JSON));
        assert_eq!(entry.defaults().status, None);
    }

    #[test]
    fn try_route_reports_invalid_patterns() {
        let mut router = Router::new();
        let result = router.try_route(
            &[Method::Get],
            "/user/:",
            from_fn(|_ctx, _next| Box::pin(async { Ok(None) })),
        );
        assert!(matches!(result, Err(crate::Error::InvalidPattern { .. })));
        assert!(router.is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid route pattern")]
    fn helpers_panic_on_invalid_patterns() {
        let mut router = Router::new();
        router.get("/files/(", |_ctx, _next| Box::pin(async { Ok(None) }));
    }
}
