//! # enface
//!
//! Enface authentication broker binary: loads settings, installs logging and
//! serves the handshake endpoint until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use enface_broker::Broker;
use enface_core::cipher::TokenCipher;
use enface_settings::BrokerSettings;
use enface_telemetry::TelemetryConfig;

/// Enface authentication broker.
#[derive(Parser, Debug)]
#[command(name = "enface", about = "Enface biometric authentication broker")]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = "enface.json")]
    config: PathBuf,

    /// Port to bind (overrides settings if specified; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Verbose broker logging.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, settings: &mut BrokerSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.debug {
            settings.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = enface_settings::load_settings_from_path(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    args.apply(&mut settings);

    let telemetry = TelemetryConfig::for_broker(settings.debug, settings.log_json);
    enface_telemetry::init_telemetry(&telemetry).context("Failed to install tracing subscriber")?;

    settings.validate().context("Invalid settings")?;
    let key = settings.secret_key().context("Invalid secret code")?;
    tracing::debug!(?settings, "settings loaded");

    let config = enface_server::broker_config(&settings);
    tracing::info!(
        project_id = %config.project_id,
        callback_url = %config.callback_url,
        ttl_secs = config.ttl.as_secs(),
        "starting enface broker"
    );
    let broker = Arc::new(Broker::new(config, TokenCipher::new(key)));

    let handle = enface_server::start(&settings.server, broker)
        .await
        .with_context(|| format!("Failed to bind {}:{}", settings.server.host, settings.server.port))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
