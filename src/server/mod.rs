//! HTTP surface: JSON API plus the two SSE streams per run.

pub mod api;
pub mod stream;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::settings::ServerSettings;
use api::AppState;

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind, serve until Ctrl+C, then return.
pub async fn start_server(settings: ServerSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.config_dir).with_context(|| {
        format!(
            "Failed to create config directory {}",
            settings.config_dir.display()
        )
    })?;

    let dev = settings.dev;
    let addr = format!("{}:{}", settings.bind_host(), settings.port);
    let state = Arc::new(AppState::new(settings));

    let mut app = build_router(state);
    if dev {
        app = app.layer(CorsLayer::permissive());
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("blj-web listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(tmp: &TempDir) -> Router {
        let settings = ServerSettings {
            config_dir: tmp.path().join("config"),
            pipelines_dir: tmp.path().join("pipelines"),
            ..Default::default()
        };
        build_router(Arc::new(AppState::new(settings)))
    }

    #[tokio::test]
    async fn test_router_serves_health() {
        let tmp = TempDir::new().unwrap();
        let response = test_router(&tmp)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let tmp = TempDir::new().unwrap();
        let response = test_router(&tmp)
            .oneshot(
                Request::builder()
                    .uri("/api/nothing-here")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dev_cors_layer_answers_preflight() {
        let tmp = TempDir::new().unwrap();
        let app = test_router(&tmp).layer(CorsLayer::permissive());
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/catalog")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }
}
