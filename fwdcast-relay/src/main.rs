use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fwdcast_relay::{create_app, session, Args, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env();
    config.apply_args(&args);
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwdcast_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(public_base = %config.effective_public_base(), "relay configuration loaded");

    let sessions = session::SessionStore::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    session::spawn_sweeper(sessions.clone(), shutdown_rx.clone());

    let state = AppState {
        sessions: sessions.clone(),
        config: config.clone(),
    };

    let app = create_app(state);

    let addr = SocketAddr::from((
        config
            .listen_host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| {
                warn!(host = %config.listen_host, "could not parse LISTEN_HOST, falling back to 0.0.0.0");
                std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
            }),
        config.listen_port,
    ));

    info!(%addr, "starting fwdcast relay");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, sessions))
        .await?;

    Ok(())
}

/// Waits for ctrl_c, then signals the sweeper to stop and expires every
/// live session (sending `expired` to each connected Origin) before
/// `axum::serve` finishes draining in-flight connections.
async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>, sessions: session::SessionStore) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested, expiring all sessions");
        let _ = shutdown_tx.send(true);
        sessions.expire_all().await;
    }
}
