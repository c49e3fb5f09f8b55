//! tiktok-relay - TikTok live chat relay daemon.

use std::sync::Arc;
use tiktok_relay::config::validation::validate;
use tiktok_relay::config::{Config, LogFormat};
use tiktok_relay::server::RelayServer;
use tiktok_relay::upstream::BridgeProvider;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relay.toml".to_string());

    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env()?;

    init_tracing(config.logging.format);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "configuration has {} error(s), see above",
            errors.len()
        ));
    }

    info!(
        account = %config.upstream.username,
        bridge = %config.upstream.bridge_url,
        "Starting tiktok-relay"
    );

    tiktok_relay::metrics::init();

    let provider = Arc::new(BridgeProvider::new(&config.upstream));
    let server = RelayServer::start(&config, provider).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await;

    Ok(())
}
