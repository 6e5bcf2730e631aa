//! API route definitions: a health check and the WebSocket
//! upgrade endpoint that fronts the whole collaboration core. There is
//! intentionally no broader REST surface — every collaboration operation
//! travels over the socket.

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::api::handlers;
use crate::api::middleware::{cors_layer, logging_layer};
use crate::api::ws::{BackpressureManager, RateLimiter, TimeoutManager, WebSocketMetrics, ws_handler};
use crate::bus::CoordinationBus;
use crate::db::DatabaseConnection;
use crate::presence::PresenceTracker;
use crate::serializer::ProjectSerializer;
use crate::services::auth::JwtVerifier;
use crate::session::SessionRegistry;
use crate::api::ws::ConnectionHub;

/// Shared application state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub bus: Arc<dyn CoordinationBus>,
    pub hub: Arc<ConnectionHub>,
    pub sessions: Arc<SessionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub serializer: Arc<ProjectSerializer>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub instance_id: String,
    pub metrics: Arc<WebSocketMetrics>,
    pub rate_limiter: Arc<RateLimiter>,
    pub backpressure: Arc<BackpressureManager>,
    pub timeouts: Arc<TimeoutManager>,
}

/// Build the complete API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/system/health", get(handlers::health_detailed))
        .route("/ws", get(ws_handler))
        .layer(logging_layer())
        .layer(cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::store::SnapshotStore;
    use std::time::Duration;

    async fn test_state() -> AppState {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        let bus: Arc<dyn CoordinationBus> = Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)));
        let store = Arc::new(SnapshotStore::new(db.pool().clone()));
        AppState {
            db,
            bus: bus.clone(),
            hub: Arc::new(ConnectionHub::new(bus.clone())),
            sessions: Arc::new(SessionRegistry::new(bus.clone(), bus.clone(), Duration::from_secs(300))),
            presence: Arc::new(PresenceTracker::new(bus.clone())),
            serializer: Arc::new(ProjectSerializer::new(store, bus.clone(), bus.clone(), 5)),
            jwt_verifier: Arc::new(JwtVerifier::new("test-secret")),
            instance_id: "inst-a".to_string(),
            metrics: Arc::new(WebSocketMetrics::new()),
            rate_limiter: Arc::new(RateLimiter::default_limit()),
            backpressure: Arc::new(BackpressureManager::new_default()),
            timeouts: Arc::new(TimeoutManager::new_default()),
        }
    }

    #[tokio::test]
    async fn test_router_creation_does_not_panic() {
        let _router = create_router(test_state().await);
    }
}
