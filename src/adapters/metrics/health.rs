//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes `/live` and `/ready` endpoints via axum for Docker health
//! checks and orchestrator probes. Readiness requires at least one
//! listener in `Running` or `Degraded` state — a fleet where every
//! listener is `Stopped`/`Idle` has nothing useful to report on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::ListenerRunState;

/// Shared health state, updated by the manager as supervisors transition.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    states: Arc<Mutex<HashMap<Uuid, ListenerRunState>>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_state(&self, listener_id: Uuid, state: ListenerRunState) {
        self.states.lock().await.insert(listener_id, state);
    }

    pub async fn remove(&self, listener_id: &Uuid) {
        self.states.lock().await.remove(listener_id);
    }

    /// Ready once any listener is `Running` or `Degraded`.
    pub async fn is_ready(&self) -> bool {
        self.states.lock().await.values().any(|s| s.counts_as_ready())
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    state: HealthState,
    port: u16,
}

impl HealthServer {
    pub fn new(state: HealthState, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health check server, shutting down when `shutdown_rx` fires.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(self.state);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
                .await?;

        Ok(())
    }

    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        if state.is_ready().await {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_ready_with_no_listeners() {
        let state = HealthState::new();
        assert!(!state.is_ready().await);
    }

    #[tokio::test]
    async fn ready_once_a_listener_is_running() {
        let state = HealthState::new();
        let id = Uuid::new_v4();
        state.set_state(id, ListenerRunState::Running).await;
        assert!(state.is_ready().await);
    }

    #[tokio::test]
    async fn not_ready_after_listener_stops() {
        let state = HealthState::new();
        let id = Uuid::new_v4();
        state.set_state(id, ListenerRunState::Running).await;
        state.set_state(id, ListenerRunState::Stopped).await;
        assert!(!state.is_ready().await);
    }
}
