//! HTTP/1.1 wire response.
//!
//! This is the value the dispatcher hands back to the transport layer: a status, a
//! header list and a payload that is either fully buffered or a byte stream.
//! [`Response::into_bytes`] serializes buffered responses; [`Response::write_to`]
//! handles both kinds, framing streams with chunked transfer encoding.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Headers, StatusCode};

/// A readable byte stream used as a response body.
pub type BodyStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Body of a wire response.
pub enum Payload {
    /// A fully buffered body (possibly empty).
    Full(Bytes),
    /// A body produced incrementally, passed through untouched.
    Stream(BodyStream),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Payload::Stream(_) => f.write_str("Stream"),
        }
    }
}

// Size of each chunk read from a streaming body.
const STREAM_CHUNK_SIZE: usize = 16 * 1024;

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use canopy::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    payload: Payload,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            payload: Payload::Full(Bytes::new()),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.payload = Payload::Full(Bytes::from(body.into()));
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.payload = Payload::Full(body.into());
        self
    }

    /// Sets a streaming body.
    #[must_use]
    pub fn stream(mut self, stream: BodyStream) -> Self {
        self.payload = Payload::Stream(stream);
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response headers for in-place edits.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the body payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns the buffered body, or `None` for streaming bodies.
    pub fn full_body(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Full(bytes) => Some(bytes),
            Payload::Stream(_) => None,
        }
    }

    /// Drains a streaming body into memory, turning it into a buffered one.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading the stream.
    pub async fn buffered(mut self) -> io::Result<Self> {
        if let Payload::Stream(stream) = &mut self.payload {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            self.payload = Payload::Full(Bytes::from(buf));
        }
        Ok(self)
    }

    /// Consumes the response and returns its body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading a streaming body.
    pub async fn text(self) -> io::Result<String> {
        let buffered = self.buffered().await?;
        let bytes = buffered.full_body().unwrap_or_default();
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was set.
    /// - `Content-Length: <n>` (always written).
    /// - `Connection: keep-alive` or `Connection: close`.
    ///
    /// A streaming payload is not read here and serializes as an empty body; use
    /// [`write_to`](Self::write_to) or [`buffered`](Self::buffered) for those.
    pub fn into_bytes(mut self) -> BytesMut {
        let body = match std::mem::replace(&mut self.payload, Payload::Full(Bytes::new())) {
            Payload::Full(bytes) => bytes,
            Payload::Stream(_) => Bytes::new(),
        };
        let mut buf = self.head(Some(body.len()));
        if !body.is_empty() && !self.status.is_null_body() {
            buf.put(body);
        }
        buf
    }

    /// Writes the response to `writer`.
    ///
    /// Buffered bodies are written with `Content-Length`; streaming bodies with
    /// `Transfer-Encoding: chunked`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading the body or writing to `writer`.
    pub async fn write_to<W>(mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match std::mem::replace(&mut self.payload, Payload::Full(Bytes::new())) {
            Payload::Full(bytes) => {
                self.payload = Payload::Full(bytes);
                writer.write_all(&self.into_bytes()).await?;
            }
            Payload::Stream(_) if self.status.is_null_body() => {
                writer.write_all(&self.head(None)).await?;
            }
            Payload::Stream(mut stream) => {
                writer.write_all(&self.head(None)).await?;
                let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];
                loop {
                    let n = stream.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(format!("{n:X}\r\n").as_bytes()).await?;
                    writer.write_all(&chunk[..n]).await?;
                    writer.write_all(b"\r\n").await?;
                }
                writer.write_all(b"0\r\n\r\n").await?;
            }
        }
        writer.flush().await
    }

    // Status line, headers and the framing header. `None` frames the body as chunks.
    fn head(&mut self, content_length: Option<usize>) -> BytesMut {
        let has_body = content_length != Some(0) && !self.status.is_null_body();
        if has_body && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers
            .set("Connection", if self.keep_alive { "keep-alive" } else { "close" });

        // 1xx, 204 and 304 carry no framing header at all.
        let framing = match content_length {
            _ if self.status.is_null_body() => String::new(),
            Some(n) => format!("Content-Length: {n}\r\n"),
            None => "Transfer-Encoding: chunked\r\n".to_owned(),
        };
        let head = format!(
            "HTTP/1.1 {} {}\r\n{}{framing}\r\n",
            self.status.as_u16(),
            self.status.canonical_reason(),
            self.headers,
        );
        let mut buf = BytesMut::with_capacity(head.len() + content_length.unwrap_or(0));
        buf.put(head.as_bytes());
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
