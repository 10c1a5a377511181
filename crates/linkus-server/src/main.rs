use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use linkus_api::auth::{AppState, AppStateInner};
use linkus_api::config::Config;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "linkus_server=debug,linkus_api=debug,linkus_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("LINKUS_JWT_SECRET is unset or a placeholder; tokens are forgeable. Set a random secret before deploying.");
    }

    // Init database
    let db = linkus_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let state = AppStateInner::new(&config, db)?;
    if state.mailer.is_enabled() {
        state.mailer.verify_connection().await;
    } else {
        info!("Verification emails disabled; links will be logged instead");
    }

    tokio::spawn(prune_limiters(state.clone()));

    let app = linkus_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("LinkUs server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Forget rate-limit buckets for clients that have gone quiet.
async fn prune_limiters(state: AppState) {
    let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
    loop {
        interval.tick().await;
        state.auth_limiter.prune();
        state.general_limiter.prune();
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
