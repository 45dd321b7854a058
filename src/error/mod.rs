//! Error taxonomy and the error-handler hook.
//!
//! Handlers report failures through [`Error`]. The one variant the dispatcher
//! recovers from close to its origin is [`Error::Http`]: the middleware chain hands
//! the [`HttpError`] to the application's [`ErrorHandler`], which renders it into a
//! regular response. Every other variant travels up to [`Application::handle`],
//! where it is logged and replaced by a generic `500` page.
//!
//! [`Application::handle`]: crate::app::Application::handle

use std::sync::Arc;

use crate::context::Context;
use crate::http::StatusCode;
use crate::response::{HttpResponse, content_type};

/// A typed HTTP error: a status code plus a human-readable message.
///
/// Return it from a handler (usually with `?`) to stop the chain at that step
/// and let the error handler produce the response.
///
/// # Examples
///
/// ```
/// use canopy::{HttpError, StatusCode};
///
/// let err = HttpError::not_found("no such user");
/// assert_eq!(err.status(), StatusCode::NotFound);
/// assert_eq!(err.to_string(), "404 no such user");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code} {message}", code = .status.as_u16())]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Creates an error with an arbitrary status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, message)
    }

    /// `401 Unauthorized`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthorized, message)
    }

    /// `403 Forbidden`.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Forbidden, message)
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    /// `405 Method Not Allowed`.
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::MethodNotAllowed, message)
    }

    /// `500 Internal Server Error`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Every failure the dispatch core can observe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The application has no route entries at all. A setup mistake, not a miss.
    #[error("no routes are registered on the application")]
    NoRoutes,

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A handler invoked its continuation more than once.
    #[error("next() called multiple times")]
    NextCalledTwice,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any error raised inside a handler as a fatal (non-HTTP) failure.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Handler(err.into())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Turns a typed HTTP error into a response.
pub type ErrorHandler = Arc<dyn Fn(&Context, &HttpError) -> HttpResponse + Send + Sync>;

/// The error handler installed on every new application: an HTML page titled
/// `Error {code}: {message}` carrying the error's status.
pub fn default_error_handler(_ctx: &Context, error: &HttpError) -> HttpResponse {
    HttpResponse::new()
        .with_status(error.status())
        .with_type(content_type::HTML)
        .with_body(error_page(error))
}

/// Renders the HTML error page used by [`default_error_handler`].
pub fn error_page(error: &HttpError) -> String {
    let title = format!("Error {}: {}", error.status().as_u16(), error.message());
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html;charset=UTF-8\">\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <div style=\"text-align: center;\">\n\
         <h3>{title}</h3><hr />\n\
         <p>Powered by canopy</p>\n\
         </div>\n\
         </body>\n\
         </html>"
    )
}
