//! Static file serving.
//!
//! Maps a request path below a mount point onto a directory and streams the file
//! back. Directories are served through their `index.html`.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File};
use tracing::{debug, error};

use crate::context::Context;
use crate::error::{HttpError, error_page};
use crate::http::{BodyStream, StatusCode};
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult, Next};
use crate::response::{HttpResponse, content_type};
use crate::router::normalize_path;

pub const INDEX_FILENAME: &str = "index.html";

// Joins `url_path` onto `base`, refusing anything but plain segments.
fn map_path(base: &Path, url_path: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    for component in Path::new(url_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

/// The content type for a file, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => content_type::HTML,
        "txt" => content_type::PLAIN,
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => content_type::JSON,
        "xml" => "application/xml",
        "csv" => "text/csv; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn internal(path: &Path, err: io::Error) -> HttpError {
    error!(path = %path.display(), error = %err, "failed to read static file");
    HttpError::internal(err.to_string())
}

/// Opens `path` and returns a streaming `200` response for it.
///
/// # Errors
///
/// `404` when the file does not exist, `403` for a directory.
pub async fn serve_file(path: &Path) -> Result<HttpResponse, HttpError> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(HttpError::not_found("The file is not found"));
        }
        Err(e) => return Err(internal(path, e)),
    };
    if metadata.is_dir() {
        return Err(HttpError::forbidden("The requested file is a directory"));
    }

    let file = File::open(path).await.map_err(|e| internal(path, e))?;
    debug!(path = %path.display(), bytes = metadata.len(), "serving static file");
    let stream: BodyStream = Box::new(file);
    Ok(HttpResponse::new()
        .with_status(StatusCode::Ok)
        .with_type(content_type_for(path))
        .with_body(stream))
}

/// Serves `request_path`, mounted at `mount`, from `dir`.
///
/// A directory is served through its `index.html`; a directory without one is
/// `403`. Paths that escape `dir` or name nothing are `404`.
pub async fn serve_static(
    request_path: &str,
    mount: &str,
    dir: &Path,
) -> Result<HttpResponse, HttpError> {
    let mount = normalize_path(mount);
    let relative = match mount.as_str() {
        "/" => request_path,
        mount => request_path.strip_prefix(mount).unwrap_or(request_path),
    };

    let not_found = || HttpError::not_found("The page was not found");
    let file = map_path(dir, relative).ok_or_else(not_found)?;

    match fs::metadata(&file).await {
        Ok(metadata) if metadata.is_dir() => {
            let index = file.join(INDEX_FILENAME);
            match fs::metadata(&index).await {
                Ok(index_meta) if index_meta.is_file() => serve_file(&index).await,
                _ => serve_file(&file).await,
            }
        }
        Ok(_) => serve_file(&file).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
        Err(e) => Err(internal(&file, e)),
    }
}

/// Handler registered by [`Router::serve_static`](crate::router::Router::serve_static).
///
/// Failures are rendered as HTML error pages right here rather than through the
/// application's error handler.
pub struct StaticFiles {
    mount: String,
    dir: PathBuf,
}

impl StaticFiles {
    pub fn new(mount: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            mount: normalize_path(&mount.into()),
            dir: dir.into(),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Middleware for StaticFiles {
    fn handle<'a>(&'a self, ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let response = match serve_static(ctx.path(), &self.mount, &self.dir).await {
                Ok(response) => response,
                Err(error) => HttpResponse::new()
                    .with_status(error.status())
                    .with_type(content_type::HTML)
                    .with_body(error_page(&error)),
            };
            Ok(Some(response))
        })
    }
}
