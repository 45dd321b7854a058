//! Serves a directory, a JSON echo endpoint and a redirect.
//!
//! ```text
//! RUST_LOG=canopy=debug cargo run --example static_server -- ./public 8080
//! ```

use canopy::{
    Application, HttpError, HttpResponse, Router, StatusCode,
    config::{AppConfig, ServerConfig},
    middleware::LoggerMiddleware,
    response::redirect,
    security::CorsMiddleware,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| ".".to_owned());
    let port = args.next().and_then(|p| p.parse().ok()).unwrap_or(8080);

    let mut api = Router::new();
    api.post("/echo", |ctx, _next| {
        Box::pin(async move {
            let body: serde_json::Value = ctx
                .json()
                .map_err(|e| HttpError::bad_request(format!("invalid JSON: {e}")))?;
            Ok(Some(HttpResponse::json(&body)?.with_status(StatusCode::Created)))
        })
    })
    .get("/home", |_ctx, _next| Box::pin(async { Ok(Some(redirect("/", None))) }));

    let mut site = Router::new();
    site.serve_static("/", &dir);

    let mut app = Application::with_config(AppConfig { logging: true });
    app.use_middleware(None, LoggerMiddleware)
        .use_middleware(Some("/api"), CorsMiddleware::new())
        .use_router(Some("/api"), &api)
        .use_router(None, &site);

    app.listen(ServerConfig::new("127.0.0.1", port)).await?;
    Ok(())
}
