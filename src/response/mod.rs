//! Handler-facing response model.
//!
//! [`HttpResponse`] is what handlers return and what the middleware chain
//! accumulates into. Unlike the wire [`Response`](crate::http::Response), every
//! field is optional or loosely typed until [`HttpResponse::transform`] produces the
//! value handed to the transport.

use std::fmt;

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::Value;

use crate::cookie::CookieStorage;
use crate::http::{BodyStream, Headers, Response, StatusCode};

/// Common `Content-Type` values.
pub mod content_type {
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const FORM: &str = "application/x-www-form-urlencoded";
}

// application/x-www-form-urlencoded leaves `*-._` and alphanumerics alone.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b' ');

/// The body of an [`HttpResponse`].
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    /// Name/value pairs, url-encoded on output.
    Form(Vec<(String, String)>),
    /// A structured value serialized as JSON text on output.
    Json(Value),
    /// Passed through to the transport untouched.
    Stream(BodyStream),
}

impl Body {
    /// `true` for bodies that produce no content: `Empty`, empty text, and the
    /// JSON values `null`, `false`, `0` and `""`.
    pub fn is_falsy(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Json(value) => json_is_falsy(value),
            Body::Bytes(_) | Body::Form(_) | Body::Stream(_) => false,
        }
    }

    /// The body as text, when it is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Form(pairs) => f.debug_tuple("Form").field(pairs).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_owned())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<i64> for Body {
    fn from(n: i64) -> Self {
        Body::Json(Value::from(n))
    }
}

impl From<f64> for Body {
    fn from(n: f64) -> Self {
        Body::Json(Value::from(n))
    }
}

impl From<bool> for Body {
    fn from(b: bool) -> Self {
        Body::Json(Value::Bool(b))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<BodyStream> for Body {
    fn from(stream: BodyStream) -> Self {
        Body::Stream(stream)
    }
}

fn json_is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| {
            let name = utf8_percent_encode(name, FORM_VALUE).to_string();
            let value = utf8_percent_encode(value, FORM_VALUE).to_string();
            format!("{}={}", name.replace(' ', "+"), value.replace(' ', "+"))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Per-entry fallbacks for the status, content type and headers of a
/// handler's response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDefaults {
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
    pub headers: Headers,
}

impl RouteDefaults {
    /// No fallbacks at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// The defaults a [`Router`](crate::router::Router) applies unless told
    /// otherwise: `200` with a plain-text content type.
    pub fn plain_text() -> Self {
        Self {
            status: Some(StatusCode::Ok),
            content_type: Some(content_type::PLAIN.to_owned()),
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A response as seen by handlers.
///
/// # Examples
///
/// ```
/// use canopy::{HttpResponse, StatusCode};
///
/// let res = HttpResponse::new()
///     .with_status(StatusCode::Created)
///     .with_type("text/plain")
///     .with_header("X-Id", "7")
///     .with_body("made");
/// assert_eq!(res.status(), StatusCode::Created);
/// assert_eq!(res.body().as_text(), Some("made"));
/// ```
#[derive(Debug, Default)]
pub struct HttpResponse {
    body: Body,
    headers: Headers,
    status: Option<StatusCode>,
    content_type: Option<String>,
}

impl HttpResponse {
    /// An empty response with no status, type or headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A response whose body is produced by `producer`.
    pub fn with_body_fn<F, B>(producer: F) -> Self
    where
        F: FnOnce() -> B,
        B: Into<Body>,
    {
        Self::new().with_body(producer())
    }

    /// A JSON response with the `application/json` type.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when `value` cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new()
            .with_type(content_type::JSON)
            .with_body(serde_json::to_value(value)?))
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// The status, `200` when none was set.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Ok)
    }

    /// The status exactly as set.
    pub fn status_opt(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// `true` when there are no headers and the body is falsy.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.body.is_falsy()
    }

    /// Appends one `Set-Cookie` header per cookie marked for transmission, in
    /// store order.
    pub fn apply_cookies(&mut self, cookies: &CookieStorage) {
        for cookie in cookies.iter().filter(|c| c.overwrite()) {
            self.headers.insert("Set-Cookie", cookie.to_string());
        }
    }

    /// Folds a handler's response into this accumulated one.
    ///
    /// The body is replaced. Status and content type come from `returned`, falling
    /// back to `defaults`. Headers are the first-wins union of `returned`, the
    /// defaults and the headers accumulated so far.
    pub fn merge(&mut self, returned: HttpResponse, defaults: &RouteDefaults) {
        self.headers = Headers::union([&returned.headers, &defaults.headers, &self.headers]);
        self.body = returned.body;
        self.status = returned.status.or(defaults.status);
        self.content_type = returned
            .content_type
            .or_else(|| defaults.content_type.clone());
    }

    /// Converts into the wire response.
    ///
    /// Headers with empty values are dropped and the content type replaces any
    /// `Content-Type` header. Falsy bodies become empty, and statuses 101, 204, 205
    /// and 304 never carry a body.
    pub fn transform(self) -> Response {
        let status = self.status();
        let mut response = Response::new(status);
        for (name, value) in self.headers.iter().filter(|(_, value)| !value.is_empty()) {
            response.add_header(name, value);
        }
        if let Some(content_type) = self.content_type {
            response.headers_mut().set("Content-Type", content_type);
        }

        if status.is_null_body() {
            return response;
        }
        match self.body {
            Body::Empty => response,
            Body::Text(text) => response.body(text),
            Body::Bytes(bytes) => response.body_bytes(bytes),
            Body::Form(pairs) => response.body(encode_form(&pairs)),
            Body::Json(value) if json_is_falsy(&value) => response,
            Body::Json(value) => response.body(value.to_string()),
            Body::Stream(stream) => response.stream(stream),
        }
    }
}

impl From<&str> for HttpResponse {
    fn from(text: &str) -> Self {
        Self::new().with_body(text)
    }
}

impl From<String> for HttpResponse {
    fn from(text: String) -> Self {
        Self::new().with_body(text)
    }
}

impl From<Value> for HttpResponse {
    fn from(value: Value) -> Self {
        Self::new().with_body(value)
    }
}

impl From<i64> for HttpResponse {
    fn from(n: i64) -> Self {
        Self::new().with_body(n)
    }
}

impl From<bool> for HttpResponse {
    fn from(b: bool) -> Self {
        Self::new().with_body(b)
    }
}

/// A redirect to `location`. `None` selects `307 Temporary Redirect`.
///
/// ```
/// use canopy::{StatusCode, response::redirect};
///
/// let res = redirect("/login", None);
/// assert_eq!(res.status(), StatusCode::TemporaryRedirect);
/// assert_eq!(res.headers().get("location"), Some("/login"));
/// ```
pub fn redirect(location: impl Into<String>, status: Option<StatusCode>) -> HttpResponse {
    HttpResponse::new()
        .with_status(status.unwrap_or(StatusCode::TemporaryRedirect))
        .with_header("Location", location)
}
