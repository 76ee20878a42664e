//! HTTP and WebSocket API surface for the tether gateway

mod auth;
pub mod devices;
pub mod health;
pub mod pairing;
pub mod proximity;
pub mod rate_limit;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{ChallengeManager, SessionIssuer};
use crate::config::Config;
use crate::db::DbPool;
use crate::hub::ConnectionHub;
use crate::proximity::ProximityEngine;
use crate::registry::DeviceRegistry;
use crate::{Error, Result};

pub use auth::require_session;

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    pub registry: DeviceRegistry,
    pub challenges: ChallengeManager,
    pub sessions: SessionIssuer,
    pub proximity: ProximityEngine,
    pub hub: ConnectionHub,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

impl ApiState {
    /// Build API state from configuration and an initialized pool
    #[must_use]
    pub fn new(pool: DbPool, config: &Config) -> Self {
        Self {
            registry: DeviceRegistry::new(pool.clone()),
            challenges: ChallengeManager::new(pool.clone()),
            db: pool,
            sessions: SessionIssuer::new(&config.session_secret),
            proximity: ProximityEngine::new(),
            hub: ConnectionHub::new(),
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            rate_limiter: config.rate_limit_rpm.map(rate_limit::create_limiter),
        }
    }
}

/// Build the full router with all routes and layers
pub fn router(state: Arc<ApiState>) -> Router {
    let router = Router::new()
        .merge(devices::router(state.clone()))
        .merge(pairing::router(state.clone()))
        .merge(proximity::router(state.clone()))
        .merge(websocket::router(state.clone()))
        .merge(health::router());

    // Rate limiting (no-op unless configured)
    let router = router.layer(axum::middleware::from_fn_with_state(
        state,
        rate_limit::rate_limit_middleware,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Create a server from configuration and an initialized pool
    #[must_use]
    pub fn new(config: &Config, pool: DbPool) -> Self {
        Self {
            state: Arc::new(ApiState::new(pool, config)),
            host: config.host.clone(),
            port: config.port,
        }
    }

    /// Shared state handle (used by embedding callers and tests)
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "gateway listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| Error::Config(format!("server error: {e}")))?;

        Ok(())
    }
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) | Self::Verification => StatusCode::UNAUTHORIZED,
            Self::DeviceNotFound(_) | Self::ChallengeNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    /// Every failure leaves the boundary as a structured payload; raw
    /// errors and stack traces never reach a client.
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error on request path");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
