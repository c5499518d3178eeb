use std::{net::SocketAddr, sync::Arc};

use snippetbox::{
    AppState, HtmlRenderer, MemorySessionStore,
    config::{AppConfig, Env},
    create_router,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
    session_store::{EXPIRED_SESSION_SWEEP, spawn_expired_deletion},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, wires persistence and the session
/// store (with its expired-record sweep), then serves the router until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail-fast on missing production settings)
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    // 2. Logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "snippetbox=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(debug = config.debug, "application starting in {:?} mode", config.env);

    let addr = config.bind_address();
    let renderer = Arc::new(HtmlRenderer);

    // 3. Persistence and session store, then the router
    let app = match config.db_url.clone() {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let repo = PostgresRepository::new(pool.clone());
            repo.migrate().await?;

            let store = PostgresStore::new(pool);
            store.migrate().await?;
            spawn_expired_deletion(store.clone(), EXPIRED_SESSION_SWEEP);

            let state = AppState {
                repo: Arc::new(repo) as RepositoryState,
                renderer,
                config,
            };
            create_router(state, store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory persistence");
            let state = AppState {
                repo: Arc::new(MemoryRepository::new()) as RepositoryState,
                renderer,
                config,
            };
            let store = MemorySessionStore::new();
            spawn_expired_deletion(store.clone(), EXPIRED_SESSION_SWEEP);
            create_router(state, store)
        }
    };

    // 4. Server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
