use clap::Parser;
use courier::{Args, RelayAgent, RelayConfig};
use std::error::Error as StdError;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Logs an error together with its chain of causes.
fn report(err: &dyn StdError) {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    tracing::error!("{}", message);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Configuration is validated before any socket is opened.
    let config = RelayConfig::try_from(args).inspect_err(|e| report(e))?;

    tracing::info!(
        "Relaying from '{}' to '{}' as {}",
        config.client_interface,
        config.server_interface,
        config.relay_address
    );

    let agent = RelayAgent::new(config).inspect_err(|e| report(e))?;

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = stop.send(true);
            }
            Err(e) => {
                // Keep `stop` alive; dropping it would read as a shutdown request.
                tracing::warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    agent.run(shutdown).await.inspect_err(|e| report(e))?;
    Ok(())
}
