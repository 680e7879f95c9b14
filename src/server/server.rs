//! HTTP server with axum router and graceful shutdown.

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{
    create_agent, end_session, get_agent, get_curriculum, get_events_sse, get_health,
    get_knowledge, get_session, list_agents, list_messages, start_session, teach,
};
use super::state::AppState;
use crate::config::ServerConfig;

/// HTTP server exposing agents, sessions and progress events.
pub struct PupilServer {
    /// Server configuration.
    config: ServerConfig,
    /// Application state shared across handlers.
    state: AppState,
}

impl PupilServer {
    /// Create a new server with default configuration.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            config: ServerConfig::default(),
            state,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/health", get(get_health))
            .route("/api/curriculum", get(get_curriculum))
            .route("/api/agents", get(list_agents).post(create_agent))
            .route("/api/agents/:id", get(get_agent))
            .route("/api/agents/:id/knowledge", get(get_knowledge))
            .route("/api/agents/:id/sessions", post(start_session))
            .route("/api/sessions/:id", get(get_session))
            .route("/api/sessions/:id/messages", get(list_messages).post(teach))
            .route("/api/sessions/:id/end", post(end_session))
            .route("/api/events", get(get_events_sse))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server, binding to the configured address.
    ///
    /// The server will run until the cancellation token is triggered,
    /// at which point it will perform a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.address();
        let cancel = self.state.cancel.clone();
        let app = self.build_router();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindError {
                address: addr.clone(),
                source,
            })?;
        tracing::info!(address = %addr, "Starting tutoring server");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Tutoring server shutting down gracefully");
            })
            .await
            .map_err(ServerError::Serve)
    }
}
