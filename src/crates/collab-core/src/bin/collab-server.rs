//! collab-server binary
//!
//! Standalone server for the real-time collaboration core: accepts
//! WebSocket connections, serializes graph-mutation operations per project,
//! and fans out presence/operation events to connected peers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use collab_core::api::routes::{create_router, AppState};
use collab_core::api::ws::{BackpressureManager, RateLimiter, TimeoutManager, WebSocketMetrics};
use collab_core::bus::{CoordinationBus, InProcessBus, RedisBus};
use collab_core::config::{setup_ssl_certificates, LdapClient, SecurityState, ServerConfig, SslMode};
use collab_core::db::DatabaseConnection;
use collab_core::presence::PresenceTracker;
use collab_core::serializer::ProjectSerializer;
use collab_core::services::auth::JwtVerifier;
use collab_core::session::SessionRegistry;
use collab_core::store::SnapshotStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("Loading server configuration...");
    let config = match ServerConfig::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            return Err(format!("Configuration required: {e}. Set CONFIG_PATH or place config/collab-server.toml").into());
        }
    };

    tracing::info!("SSL Mode: {:?}", config.ssl.mode);
    tracing::info!("Security Mode: {:?}", config.security.mode);
    tracing::info!("LDAP Enabled: {}", config.ldap.enabled);
    tracing::info!("Database Path: {}", config.database.path);

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    let database_url = config.database_url();

    tracing::info!("Connecting to database: {}", database_url);
    let db = DatabaseConnection::new(&database_url).await?;

    if config.ssl.mode == SslMode::Auto || config.ssl.mode == SslMode::Pem {
        match setup_ssl_certificates(&config.ssl, None) {
            Ok(paths) => tracing::info!("SSL certificates configured: {:?}", paths.cert),
            Err(e) => tracing::warn!("SSL certificate setup failed: {}. Server will run without SSL.", e),
        }
    }

    let security_state = Arc::new(SecurityState::new(config.security.clone()));
    tracing::info!("Security mode: {:?}", security_state.mode());

    let _ldap_client = if config.ldap.enabled {
        let mut client = LdapClient::new(config.ldap.clone());
        if let Err(e) = client.connect().await {
            tracing::warn!("LDAP connection failed: {}. LDAP authentication disabled.", e);
            None
        } else {
            tracing::info!("LDAP authentication enabled");
            Some(client)
        }
    } else {
        None
    };

    tracing::info!("Running database migrations");
    db.run_migrations().await?;
    tracing::info!("Performing database health check");
    db.health_check().await?;

    let pool = db.pool();
    tracing::info!("Server name: {}", config.server.name);

    let instance_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("Server instance id: {}", instance_id);

    let session_ttl = Duration::from_secs(config.collab.session_ttl);

    // Each sub-service picks its own backend independently: a deployment can
    // run with shared sessions but a purely local socket fan-out, or vice
    // versa.
    let sockets_bus = build_bus(
        config.collab.use_shared_sockets,
        config.collab.redis_url.as_deref(),
        &instance_id,
        session_ttl,
        "sockets",
    )
    .await?;
    let sessions_bus = build_bus(
        config.collab.use_shared_sessions,
        config.collab.redis_url.as_deref(),
        &instance_id,
        session_ttl,
        "sessions",
    )
    .await?;
    let ordering_bus = build_bus(
        config.collab.use_shared_ordering,
        config.collab.redis_url.as_deref(),
        &instance_id,
        session_ttl,
        "ordering",
    )
    .await?;

    let jwt_secret = config.get_jwt_secret().ok_or("JWT_SECRET environment variable or collab.jwt_secret config value required")?;
    let jwt_verifier = Arc::new(JwtVerifier::new(jwt_secret));

    let store = Arc::new(SnapshotStore::new(pool.clone()));
    let idle_timeout = Duration::from_millis(config.collab.session_idle_ms);
    let presence_ttl = Duration::from_millis(config.collab.presence_inactive_ms);
    let state = AppState {
        db: db.clone(),
        bus: sockets_bus.clone(),
        hub: Arc::new(collab_core::api::ws::ConnectionHub::new(sockets_bus.clone())),
        sessions: Arc::new(SessionRegistry::new(sockets_bus.clone(), sessions_bus.clone(), idle_timeout)),
        presence: Arc::new(PresenceTracker::with_ttl(sockets_bus.clone(), presence_ttl)),
        serializer: Arc::new(ProjectSerializer::with_backoff(
            store,
            sockets_bus.clone(),
            ordering_bus.clone(),
            config.collab.serializer_max_retries,
            config.collab.serializer_initial_backoff_ms,
        )),
        jwt_verifier,
        instance_id,
        metrics: Arc::new(WebSocketMetrics::new()),
        rate_limiter: Arc::new(RateLimiter::default_limit()),
        backpressure: Arc::new(BackpressureManager::new_default()),
        timeouts: Arc::new(TimeoutManager::new_default()),
    };

    tracing::info!("Building API router");
    let app = create_router(state);

    tracing::info!("Starting collab-server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("collab-server shut down gracefully");
    Ok(())
}

/// Build the `CoordinationBus` for one sub-service (sockets, sessions, or
/// ordering): Redis-backed when its `use_shared_*` flag is set, in-process
/// otherwise. Each sub-service's flag is independent of the others'.
async fn build_bus(
    shared: bool,
    redis_url: Option<&str>,
    instance_id: &str,
    session_ttl: Duration,
    sub_service: &str,
) -> Result<Arc<dyn CoordinationBus>, Box<dyn std::error::Error>> {
    if shared {
        let redis_url = redis_url
            .ok_or_else(|| format!("redis_url required when use_shared_{sub_service} is set"))?;
        tracing::info!("Connecting {} to shared coordination backend: {}", sub_service, redis_url);
        Ok(Arc::new(RedisBus::connect(redis_url, instance_id.to_string(), session_ttl).await?))
    } else {
        tracing::info!("Using in-process coordination bus for {}", sub_service);
        Ok(Arc::new(InProcessBus::new(instance_id.to_string(), session_ttl)))
    }
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
