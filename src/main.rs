use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod models;
mod services;
mod storage;

use config::{Config, StorageBackend};
use services::{auth::SessionRegistry, identity::JwtIdentityProvider, otp::OtpIssuer};
use storage::{
    memory::MemoryDocumentStore, postgres::PgDocumentStore, redis::RedisClient, DocumentStore,
    LocalStorage, MemoryStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(
        config: &Config,
        documents: Arc<dyn DocumentStore>,
        device_storage: Arc<dyn LocalStorage>,
    ) -> Self {
        let identity = Arc::new(JwtIdentityProvider::new(config.identity.clone()));
        let otp = OtpIssuer::new(config.otp.clone());
        let sessions = SessionRegistry::new(device_storage, documents.clone(), identity, otp);

        Self {
            documents,
            sessions: Arc::new(sessions),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wirebazaar_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load();
    tracing::info!("Starting server in {} mode", config.server.environment);

    let (documents, device_storage): (Arc<dyn DocumentStore>, Arc<dyn LocalStorage>) =
        match config.storage.backend {
            StorageBackend::Hosted => {
                let db = PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .connect(&config.database_url())
                    .await?;
                tracing::info!("Connected to PostgreSQL");

                sqlx::migrate!("./migrations").run(&db).await?;
                tracing::info!("Database migrations completed");

                let redis = RedisClient::new(&config.redis_url()).await?;
                redis.ping().await?;
                tracing::info!("Connected to Redis");

                (Arc::new(PgDocumentStore::new(db)), Arc::new(redis))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                (
                    Arc::new(MemoryDocumentStore::new()),
                    Arc::new(MemoryStorage::new()),
                )
            }
        };

    let state = AppState::new(&config, documents, device_storage);

    // Spawn idle session sweeper
    let sessions = state.sessions.clone();
    let idle_ttl = config.session.idle_ttl;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            sessions.prune_idle(idle_ttl).await;
        }
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::router::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
