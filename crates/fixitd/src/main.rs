use anyhow::{Context, Result};
use clap::Parser;
use fixitd::{Args, Service, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fixitd=info".parse()?)
                .add_directive("fixit_engine=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServiceConfig::load(&args).context("Failed to load configuration")?;
    tracing::info!(
        state_path = ?config.state_path,
        sweep_interval_secs = config.engine.sweep_interval_secs,
        reopen_policy = ?config.engine.reopen_policy,
        "Starting fixitd"
    );

    let service = Service::start(&config)
        .await
        .context("Failed to start ticket engine")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    service.shutdown().await;
    Ok(())
}
