use crate::{
    context::Context,
    http::{Headers, Method, StatusCode},
    middleware::{BoxFuture, Middleware, MiddlewareResult, Next},
    response::HttpResponse,
};

/// CORS middleware: validates the `Origin` header, answers preflight requests and
/// adds `Access-Control-*` headers to actual responses.
///
/// # Behavior
///
/// - Without an `Origin` header, or with one that is not allowed, the request
///   passes through untouched.
/// - `OPTIONS` preflight requests are answered with `204 No Content` and the CORS
///   headers; the rest of the chain does **not** run.
/// - Any other request runs the rest of the chain, then the CORS headers are set
///   on the accumulated response.
/// - A specific (non-wildcard) origin is echoed back together with `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use canopy::{Application, security::CorsMiddleware};
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://example.com")
///     .allow_method("PATCH")
///     .allow_header("X-Custom-Header")
///     .expose_header("X-Request-Id")
///     .allow_credentials(true)
///     .max_age(600);
///
/// let mut app = Application::new();
/// app.use_middleware(None, cors);
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    credentials: Option<bool>,
    max_age: Option<u64>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a `CorsMiddleware` with permissive defaults.
    ///
    /// | Setting          | Default value                          |
    /// |------------------|----------------------------------------|
    /// | Allowed origins  | `*` (all origins)                      |
    /// | Allowed methods  | `GET`, `POST`, `PUT`, `DELETE`         |
    /// | Allowed headers  | `Content-Type`, `Authorization`        |
    /// | Max age          | 3600 seconds                           |
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE"].map(String::from).to_vec(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            exposed_headers: Vec::new(),
            credentials: None,
            max_age: Some(3600),
        }
    }

    /// Restricts the allow-list to exactly `origins`.
    #[must_use]
    pub fn origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an allowed origin. `"*"` permits every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed method, sent verbatim in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    /// Adds a response header the browser may expose to scripts.
    #[must_use]
    pub fn expose_header(mut self, header: impl Into<String>) -> Self {
        self.exposed_headers.push(header.into());
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, credentials: bool) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// How long, in seconds, a preflight answer may be cached.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    // The value for `Access-Control-Allow-Origin`, or `None` when `origin` is refused.
    // Browsers refuse `*` on credentialed requests, so the origin is echoed instead.
    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            if self.credentials == Some(true) {
                Some(origin.to_owned())
            } else {
                Some("*".to_owned())
            }
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }

    fn write_headers(&self, headers: &mut Headers, allow_origin: &str, preflight: bool) {
        headers.set("Access-Control-Allow-Origin", allow_origin);
        if !self.allowed_methods.is_empty() {
            headers.set("Access-Control-Allow-Methods", self.allowed_methods.join(", "));
        }
        if !self.allowed_headers.is_empty() {
            headers.set("Access-Control-Allow-Headers", self.allowed_headers.join(", "));
        }
        if !self.exposed_headers.is_empty() {
            headers.set("Access-Control-Expose-Headers", self.exposed_headers.join(", "));
        }
        if let Some(credentials) = self.credentials {
            headers.set("Access-Control-Allow-Credentials", credentials.to_string());
        }
        if let (true, Some(max_age)) = (preflight, self.max_age) {
            headers.set("Access-Control-Max-Age", max_age.to_string());
        }
        if allow_origin != "*" {
            headers.insert("Vary", "Origin");
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let allow_origin = ctx
                .request()
                .headers()
                .get("origin")
                .and_then(|origin| self.resolve_origin(origin));
            let Some(allow_origin) = allow_origin else {
                next.run(ctx).await?;
                return Ok(None);
            };

            if ctx.method() == &Method::Options {
                let mut preflight = HttpResponse::new().with_status(StatusCode::NoContent);
                self.write_headers(preflight.headers_mut(), &allow_origin, true);
                return Ok(Some(preflight));
            }

            next.run(ctx).await?;
            self.write_headers(ctx.response_mut().headers_mut(), &allow_origin, false);
            Ok(None)
        })
    }
}
