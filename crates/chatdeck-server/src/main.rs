//! chatdeck server binary entry point.

use chatdeck_db::{create_pool, run_migrations, DbRuntimeSettings};
use chatdeck_server::{app, config, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Resolves the config file path: first CLI argument, then
/// `CHATDECK_CONFIG_PATH`, then `config.toml`.
fn resolve_config_path() -> (String, &'static str) {
    if let Some(path) = std::env::args().nth(1) {
        return (path, "command line argument");
    }
    if let Ok(path) = std::env::var("CHATDECK_CONFIG_PATH") {
        return (path, "CHATDECK_CONFIG_PATH");
    }
    ("config.toml".to_string(), "default")
}

#[tokio::main]
async fn main() {
    let (config_path, config_source) = resolve_config_path();
    let config = config::load_config(Some(&config_path))
        .expect("failed to load configuration; check the TOML syntax in your config file");

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(path = %config_path, source = config_source, "configuration loaded");
    for provider in chatdeck_types::Provider::ALL {
        if config.providers.get(provider).api_key.is_empty() {
            tracing::warn!(%provider, "no API key configured; chats with this provider will fail");
        }
    }
    if config.speech.api_key.is_empty() {
        tracing::warn!("no speech API key configured; speech endpoints will fail");
    }

    let pool = create_pool(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let state = AppState::new(pool, &config);
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, public_url = %config.server.public_url, "starting chatdeck server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("chatdeck server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
