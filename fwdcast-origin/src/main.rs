use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fwdcast_origin::agent;
use fwdcast_origin::config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwdcast_origin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    agent::run(args, shutdown_rx).await?;
    Ok(())
}
