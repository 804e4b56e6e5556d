//! HTTP server

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Routes of the REST API
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Applications
        .route("/app/start", post(handlers::start_app))
        .route("/app/stop", post(handlers::stop_app))
        .route("/app/list", get(handlers::list_apps))

        // Logs
        .route("/logs/:id", get(handlers::app_logs))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP API Server
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        Self {
            router: router(state),
            addr,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
