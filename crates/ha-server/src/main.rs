//! Home Assistant Rust Server
//!
//! Loads `configuration.yaml`, imports the configured Redfish BMCs as
//! config entries and polls their power sensors until interrupted.

mod hass;
mod states;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ha_components::redfish_power::{RedfishPowerConfig, DOMAIN};
use ha_config::{integration_config, load_yaml, CoreConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::hass::HomeAssistant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory containing configuration.yaml
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Home Assistant (Rust)");

    let yaml = load_yaml(&args.config, "configuration.yaml")
        .with_context(|| format!("loading {}", args.config.display()))?;
    let core = CoreConfig::from_yaml(&yaml)?;
    info!("Instance '{}' ({})", core.name, core.time_zone);

    let redfish: RedfishPowerConfig = integration_config(&yaml, DOMAIN)?.unwrap_or_default();
    if redfish.devices.is_empty() {
        warn!("No devices configured under '{}'", DOMAIN);
    }

    let hass = HomeAssistant::new(&redfish);
    let imported = hass.import_devices(&redfish.devices).await;
    info!("Imported {} of {} devices", imported.len(), redfish.devices.len());

    let loaded = hass.setup_all().await;
    info!(
        "Home Assistant is running: {} entries loaded, polling every {:?}",
        loaded,
        redfish.scan_interval()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.shutdown().await;

    Ok(())
}
