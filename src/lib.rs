//! # Chatroom
//!
//! A real-time, presence-aware chat room served over WebSockets.
//!
//! ## Features
//!
//! - **One global room**: every joined client sees every chat line
//! - **Presence**: join/leave notices and online-user lists stay consistent
//!   under concurrent connect/disconnect churn
//! - **Serialized fan-out**: a single broadcaster delivers messages in order
//!   and drops recipients that can no longer be reached
//!
//! ## Modules
//!
//! - [`hub`]: Registry, sessions and the broadcaster
//! - [`api`]: HTTP server with Axum (WebSocket endpoint, health, static files)
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatroom::api::{serve, ApiConfig, AppState};
//! use chatroom::hub::{ChatHub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = ChatHub::start(HubConfig::default());
//!     let state = AppState::new(hub, ApiConfig::new("127.0.0.1", 8080));
//!
//!     serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod hub;

// Re-export top-level types for convenience
pub use api::{build_router, serve, serve_on, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, LogFormat, LoggingConfig};

pub use hub::{
    ChatHub, CloseSignal, ConnectionError, ConnectionId, HubConfig, HubError, Message,
    MessageKind, MessageSink, MessageStream, Registry, SessionEnd,
};
