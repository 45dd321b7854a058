//! Inbound HTTP/1.x requests, parsed with [`httparse`].

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use thiserror::Error;

use super::{Headers, Method};

/// Why a buffer could not be turned into a [`Request`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("request body exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },
}

/// An inbound request as seen by the dispatcher.
///
/// The target is kept as received (`/path?query`); [`path`](Request::path) and
/// [`query_string`](Request::query_string) are views into it. Query pairs are
/// decoded once, in order, and keep repeated keys.
///
/// ```
/// use canopy::http::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    path_len: usize,
    minor_version: u8,
    headers: Headers,
    query: Vec<(String, String)>,
    body: Bytes,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Builds an HTTP/1.1 request for `target` with no headers and no body.
    ///
    /// ```
    /// use canopy::http::{Method, Request};
    ///
    /// let req = Request::new(Method::Post, "/users?page=2")
    ///     .with_header("Content-Type", "application/json")
    ///     .with_body(r#"{"name":"ada"}"#);
    /// assert_eq!(req.path(), "/users");
    /// assert_eq!(req.query_param("page"), Some("2"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        Self::assemble(method, target, 1, Headers::new(), Bytes::new())
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses the head of a request out of `buf`.
    ///
    /// On success returns the request and the offset of the first body byte.
    /// Everything after that offset is taken as the body; the server trims it
    /// to `Content-Length` with [`with_body`](Request::with_body).
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] while the blank line ending the head has not
    /// arrived, [`RequestError::Parse`] for malformed input and
    /// [`RequestError::MissingField`] when httparse leaves a request-line part unset.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut head = httparse::Request::new(&mut slots);

        let httparse::Status::Complete(offset) = head.parse(buf)? else {
            return Err(RequestError::Incomplete);
        };

        let method = match head.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };
        let target = head.path.ok_or(RequestError::MissingField { field: "path" })?;
        let minor_version = head
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut headers = Headers::with_capacity(head.headers.len());
        head.headers
            .iter()
            .filter_map(|h| Some((h.name, std::str::from_utf8(h.value).ok()?)))
            .for_each(|(name, value)| headers.insert(name, value));

        let body = Bytes::copy_from_slice(&buf[offset..]);
        Ok((
            Self::assemble(method, target, minor_version, headers, body),
            offset,
        ))
    }

    fn assemble(method: Method, target: &str, minor_version: u8, headers: Headers, body: Bytes) -> Self {
        let path_len = target.find('?').unwrap_or(target.len());
        let query = target
            .get(path_len + 1..)
            .map(decode_query)
            .unwrap_or_default();
        Self {
            method,
            target: target.to_owned(),
            path_len,
            minor_version,
            headers,
            query,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path part of the target, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.target[..self.path_len]
    }

    /// The target exactly as received, query included.
    pub fn url(&self) -> &str {
        &self.target
    }

    /// `0` for HTTP/1.0, `1` for HTTP/1.1.
    pub fn version(&self) -> u8 {
        self.minor_version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The raw query string without its `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.target.get(self.path_len + 1..)
    }

    /// First decoded value for `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every decoded query pair, in order.
    pub fn query_params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// HTTP/1.1 stays open unless told to close; HTTP/1.0 only with an explicit
    /// `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .get("connection")
            .map_or(self.minor_version == 1, |c| c.eq_ignore_ascii_case("keep-alive"))
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

// `+` is a space in form-encoded queries.
fn decode_query(query: &str) -> Vec<(String, String)> {
    let decode = |raw: &str| {
        percent_decode_str(&raw.replace('+', " "))
            .decode_utf8_lossy()
            .into_owned()
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}
