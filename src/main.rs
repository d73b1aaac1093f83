//! Party lobby device binary: resolves the stored session, keeps it in sync
//! with the datastore and serves the local view API.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use party_lobby::{
    config::AppConfig,
    dao::lobby_store::{LobbyStore, memory::MemoryLobbyStore},
    realtime::ChangeFeed,
    routes,
    services::{network_monitor, resume_service},
    state::{AppState, SharedState, credentials::FileCredentialStore},
};

const START_PATH_ENV: &str = "PARTY_LOBBY_START_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let credentials = Arc::new(FileCredentialStore::new(config.credentials_path.clone()));
    let (store, feed) = backends()?;

    let app_state = AppState::new(config, store, feed, credentials);

    // Measure once before resuming so a dead datastore starts in degraded mode.
    network_monitor::probe(&app_state).await;
    let start_path = env::var(START_PATH_ENV).ok();
    match resume_service::resume(&app_state, start_path.as_deref()).await {
        Ok(view) => info!(screen = ?view.view.screen, "resumed device view"),
        Err(err) => warn!(error = %err, "failed to resume stored session; starting on home"),
    }

    tokio::spawn(network_monitor::run(app_state.clone()));
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

/// Hosted datastore when its environment is set, in-process store otherwise.
#[cfg(feature = "hosted-store")]
fn backends() -> anyhow::Result<(Arc<dyn LobbyStore>, Arc<dyn ChangeFeed>)> {
    use party_lobby::{
        dao::lobby_store::hosted::{HostedConfig, HostedLobbyStore},
        realtime::phoenix::PhoenixChangeFeed,
    };

    match HostedConfig::from_env() {
        Ok(config) => {
            let feed = PhoenixChangeFeed::new(&config);
            let store = HostedLobbyStore::new(config).context("building datastore client")?;
            info!("using hosted datastore");
            Ok((Arc::new(store), Arc::new(feed)))
        }
        Err(err) => {
            warn!(error = %err, "hosted datastore not configured; using in-memory store");
            Ok(memory_backends())
        }
    }
}

#[cfg(not(feature = "hosted-store"))]
fn backends() -> anyhow::Result<(Arc<dyn LobbyStore>, Arc<dyn ChangeFeed>)> {
    info!("built without hosted-store; using in-memory store");
    Ok(memory_backends())
}

fn memory_backends() -> (Arc<dyn LobbyStore>, Arc<dyn ChangeFeed>) {
    let store = MemoryLobbyStore::new();
    let feed = store.hub();
    (Arc::new(store), Arc::new(feed))
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

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
