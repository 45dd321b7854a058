//! Tokio TCP transport.
//!
//! Each accepted socket becomes a [`Connection`] task that frames HTTP/1.1
//! requests out of its read buffer and hands them, with the peer address, to the
//! handler. Keep-alive and pipelined requests are served in order on the same
//! socket. Streaming bodies go out chunked.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the transport.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Largest request (head plus body) a connection buffers, 8 MiB.
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUF_SIZE: usize = 4096;

/// A bound HTTP/1.1 listener.
///
/// Usually driven through [`Application::listen`](crate::Application::listen);
/// use it directly to serve a plain request handler.
///
/// ```rust,no_run
/// use canopy::server::Server;
/// use canopy::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req, peer| async move {
///         Response::new(StatusCode::Ok).body(format!("Hello, {peer}!"))
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds a listener to `addr` (`host:port`, port `0` picks a free one).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is malformed, taken or not permitted.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, one Tokio task per socket.
    ///
    /// `handler` is shared by every task and answers each request. A failed
    /// `accept` is logged and skipped.
    ///
    /// # Errors
    ///
    /// Only returns if the listener itself fails; in practice it runs until the
    /// future is dropped.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request, SocketAddr) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "canopy listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            debug!(%peer, "connection accepted");

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let conn = Connection::new(stream, peer);
                if let Err(e) = conn.serve(handler.as_ref()).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// One client socket and the bytes read from it but not yet dispatched.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    async fn serve<H, F>(mut self, handler: &H) -> io::Result<()>
    where
        H: Fn(Request, SocketAddr) -> F,
        F: Future<Output = Response>,
    {
        while let Some(request) = self.next_request().await? {
            let keep_alive = request.is_keep_alive();
            debug!(
                peer = %self.peer,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            handler(request, self.peer)
                .await
                .keep_alive(keep_alive)
                .write_to(&mut self.stream)
                .await?;

            if !keep_alive {
                debug!(peer = %self.peer, "Connection: close, shutting down");
                break;
            }
        }
        Ok(())
    }

    /// Frames the next request, reading until its head and declared body are
    /// buffered. `None` means the connection is done: the peer left, or the
    /// request was rejected with a 400 or 413.
    async fn next_request(&mut self) -> io::Result<Option<Request>> {
        loop {
            if self.buf.len() > MAX_REQUEST_SIZE {
                self.reject(StatusCode::PayloadTooLarge, "Request entity too large".to_owned())
                    .await?;
                return Ok(None);
            }

            match Request::parse(&self.buf) {
                Ok((request, body_offset)) => {
                    let end = body_offset
                        .checked_add(request.content_length().unwrap_or(0))
                        .filter(|&end| end <= MAX_REQUEST_SIZE);
                    let Some(end) = end else {
                        self.reject(StatusCode::PayloadTooLarge, "Request entity too large".to_owned())
                            .await?;
                        return Ok(None);
                    };
                    if self.buf.len() >= end {
                        let frame = self.buf.split_to(end).freeze();
                        return Ok(Some(request.with_body(frame.slice(body_offset..))));
                    }
                }
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    self.reject(StatusCode::BadRequest, format!("Bad Request: {e}"))
                        .await?;
                    return Ok(None);
                }
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                debug!(peer = %self.peer, "connection closed by peer");
                return Ok(None);
            }
        }
    }

    async fn reject(&mut self, status: StatusCode, message: String) -> io::Result<()> {
        warn!(peer = %self.peer, status = status.as_u16(), %message, "rejecting request");
        Response::new(status)
            .body(message)
            .keep_alive(false)
            .write_to(&mut self.stream)
            .await
    }
}
