mod config;
mod db;
mod element;
mod frame;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::persistence::{DocumentStore, PgDocumentStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    let port = config.port;

    let store: Option<Arc<dyn DocumentStore>> = match config.database_url.as_deref() {
        Some(url) => match db::init_pool(url, config.db_max_connections).await {
            Ok(pool) => {
                tracing::info!("document store connected");
                Some(Arc::new(PgDocumentStore::new(pool)) as Arc<dyn DocumentStore>)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database init failed; running without persistence");
                None
            }
        },
        None => {
            tracing::info!("DATABASE_URL not set; running without persistence");
            None
        }
    };

    if config.reset_token.is_empty() {
        tracing::warn!("RESET_TOKEN not set; board resets are disabled");
    }

    let state = state::AppState::new(config, store, rate_limit::RateLimitConfig::from_env());
    tracing::info!(persistence = state.persistence.is_enabled(), "state initialized");

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "collabboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
