use anyhow::Context;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use sqlx::PgPool;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use payments_service::api_keys::ApiKeyManager;
use payments_service::config::PlatformConfig;
use payments_service::metrics::PlatformMetrics;
use payments_service::providers::ProviderRegistry;
use payments_service::store::{MemoryStore, PgStore, PlatformStore};
use payments_service::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(PlatformConfig::from_env()?);

    let store: Arc<dyn PlatformStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            info!("Connected to Postgres");
            Arc::new(PgStore::new(pool, config.credential_master_key.clone()))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store (state is not durable)");
            Arc::new(MemoryStore::new())
        }
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;
    let registry = Arc::new(ProviderRegistry::with_defaults(http.clone()));
    let metrics = Arc::new(PlatformMetrics::new());
    let keys = ApiKeyManager::new(store.clone(), config.api_key_secret.clone());

    let state = AppState {
        store,
        registry,
        keys,
        http,
        metrics,
        config: config.clone(),
    };

    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    let app = router(state).layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8089".to_string())
        .parse()?;
    let addr = SocketAddr::new(host.parse()?, port);
    println!("starting payments-service on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
