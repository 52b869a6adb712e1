//! pickup-queue binary entrypoint wiring REST, SSE, and the storage backends.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pickup_queue::{
    config::AppConfig,
    dao::{
        storage::StorageError,
        store::{Storage, memory::MemoryStore},
    },
    routes,
    services::{display_sync, storage_supervisor, timer_service},
    state::{AppState, SharedState},
};

/// Which persistence engine the supervisor connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    #[cfg(feature = "mongo-store")]
    Mongo,
    #[cfg(feature = "couch-store")]
    Couch,
    Memory,
}

impl Backend {
    fn from_env() -> Self {
        let requested = env::var("STORE_BACKEND").unwrap_or_default();
        match requested.trim().to_ascii_lowercase().as_str() {
            "memory" => Backend::Memory,
            #[cfg(feature = "couch-store")]
            "couch" | "couchdb" => Backend::Couch,
            #[cfg(feature = "mongo-store")]
            "mongo" | "mongodb" => Backend::Mongo,
            "" => Self::default_backend(),
            other => {
                warn!(backend = other, "unknown STORE_BACKEND; using the default");
                Self::default_backend()
            }
        }
    }

    #[allow(unreachable_code)]
    fn default_backend() -> Self {
        #[cfg(feature = "mongo-store")]
        return Backend::Mongo;
        #[cfg(feature = "couch-store")]
        return Backend::Couch;
        Backend::Memory
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::with_config(AppConfig::load());

    let backend = Backend::from_env();
    info!(?backend, "selected storage backend");
    spawn_supervisor(app_state.clone(), backend);
    display_sync::spawn(app_state.clone());
    tokio::spawn(storage_supervisor::broadcast_degraded_changes(
        app_state.clone(),
    ));

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    timer_service::shutdown(&app_state).await;
    info!("server stopped");
    Ok(())
}

fn spawn_supervisor(state: SharedState, backend: Backend) {
    match backend {
        #[cfg(feature = "mongo-store")]
        Backend::Mongo => {
            use pickup_queue::dao::store::mongodb::{MongoConfig, MongoStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn Storage>)
            }));
        }
        #[cfg(feature = "couch-store")]
        Backend::Couch => {
            use pickup_queue::dao::store::couchdb::{CouchConfig, CouchStore};

            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn Storage>)
            }));
        }
        Backend::Memory => {
            // One store for the whole process; reconnects reuse it.
            let store = MemoryStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn Storage>) }
            }));
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
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
