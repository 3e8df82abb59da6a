//! HTTP Surface
//!
//! HTTP layer for the chat room, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws` - Chat connection (join, chat, presence updates)
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## Client
//! - `GET /*` - Static client application from the configured directory
//!
//! # Example
//!
//! ```rust,ignore
//! use chatroom::api::{serve, ApiConfig, AppState};
//! use chatroom::hub::{ChatHub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = ChatHub::start(HubConfig::default());
//!     let state = AppState::new(hub, ApiConfig::default());
//!     serve(state).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};
pub use ws::websocket_handler;

use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let static_files = ServeDir::new(&state.config.static_dir);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/health", health_routes)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Bind the configured address and serve until Ctrl+C / SIGTERM
pub async fn serve(state: AppState) -> ApiResult<()> {
    let addr = state.config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiError::Bind {
            addr: addr.clone(),
            source,
        })?;

    tracing::info!("Chat room listening on {}", addr);

    serve_on(listener, state, shutdown_signal()).await?;

    tracing::info!("Chat room shut down gracefully");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> ApiResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ApiError::Serve(e.to_string()))
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
