use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hearth_hub::catalog::CatalogServer;
use hearth_hub::engine::{CatalogClient, Engine, ServiceProfile};
use hearth_hub::services::{AlarmProfile, SmartHomeProfile, TemperatureProfile};
use hearth_hub::transport::MqttConnector;
use hearth_hub::{Config, db};

/// Hearth - IoT testbed hub: resource catalog and consumer services
#[derive(Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the resource catalog
    Catalog {
        /// Port to listen on
        #[arg(long, env = "HEARTH_CATALOG_PORT")]
        port: Option<u16>,
    },
    /// Run the temperature-mean service
    Temperature,
    /// Run the alarm service
    Alarm,
    /// Run the smart-home service
    SmartHome,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hearth_hub=info",
        1 => "info,hearth_hub=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env();
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::Catalog { port } => {
            let db = match &config.db_path {
                Some(path) => db::init(path)?,
                None => db::init_memory()?,
            };
            let port = port.unwrap_or(config.catalog_port);
            CatalogServer::new(db, config.broker.clone(), port)
                .run()
                .await?;
        }
        Command::Temperature => {
            let profile = TemperatureProfile::new(&config.device_marker);
            run_service(&config, "hearth-temperature-", profile).await?;
        }
        Command::Alarm => {
            let profile = AlarmProfile::new(&config.device_marker);
            run_service(&config, "hearth-alarm-", profile).await?;
        }
        Command::SmartHome => {
            let profile = SmartHomeProfile::new(&config.device_marker);
            run_service(&config, "hearth-smarthome-", profile).await?;
        }
    }
    Ok(())
}

/// Run one consumer service until interrupted
async fn run_service<P: ServiceProfile>(
    config: &Config,
    client_prefix: &str,
    profile: P,
) -> anyhow::Result<()> {
    let catalog = CatalogClient::new(config.catalog_url.clone())?;

    // Prefer the broker the catalog hands out; fall back to the configured one.
    let broker = match catalog.broker().await {
        Ok(broker) => broker,
        Err(e) => {
            tracing::warn!("broker lookup failed, using configured broker: {e}");
            config.broker.clone()
        }
    };
    tracing::info!(broker = %broker, catalog = %config.catalog_url, "service starting");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let engine = Arc::new(Engine::new(
        MqttConnector::new(client_prefix),
        profile,
        catalog,
        broker,
        cancel,
    ));
    engine.run().await?;
    Ok(())
}
