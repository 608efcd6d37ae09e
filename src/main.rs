//! Spectrum Back binary entrypoint wiring the HTTP/SSE surface, the local
//! cache and the remote event store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use spectrum_back::{
    config::AppConfig,
    dao::{
        event_store::{EventStore, memory::MemoryEventStore},
        local_cache::{FileCache, LocalCache},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let cache: Arc<dyn LocalCache> = Arc::new(
        FileCache::open(&config.cache_dir).context("opening local cache directory")?,
    );
    let app_state = AppState::new(config, cache);

    spawn_storage_supervisor(app_state.clone());
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the supervisor for the backend named by `STORE_BACKEND`
/// (`couch`, `mongo` or `memory`; defaults to `couch`).
fn spawn_storage_supervisor(state: SharedState) {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "couch".into());
    info!(backend = %backend, "selecting event store backend");

    match backend.as_str() {
        #[cfg(feature = "couch-store")]
        "couch" => {
            use spectrum_back::dao::event_store::couchdb::{CouchConfig, CouchEventStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchEventStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn EventStore>)
            }));
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use spectrum_back::dao::event_store::mongodb::{MongoConfig, MongoEventStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoEventStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn EventStore>)
            }));
        }
        "memory" => {
            let store = MemoryEventStore::default();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn EventStore>) }
            }));
        }
        other => {
            warn!(backend = other, "unknown or disabled store backend; running cache-only");
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
