pub mod alarm;           // Alarm correlation against the configuration
pub mod bus;             // Bus transport trait and HTTP implementation
pub mod client;          // Polling client and published state
pub mod config;          // Settings file
pub mod devices;         // Live device map, channel subjects, mobile mappings
pub mod empower;         // Thing / Channel / Link model
pub mod error;           // Error macros and parse errors
pub mod model;           // Typed bus configuration
pub mod options;         // Command line options parsing
pub mod parser;          // Raw bus JSON to typed configuration
pub mod prelude;         // Common imports and types
pub mod processor;       // Configuration to empower system
pub mod snapshot_writer; // JSON-lines dump of mobile values
pub mod subject;         // Replay-one broadcast holder

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::bus::HttpBus;
use crate::client::N2kClient;
use crate::prelude::*;
use crate::snapshot_writer::SnapshotWriter;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn init_logging(level: &str) -> std::result::Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()
}

/// Main application entry point
///
/// Loads settings, starts the client and the optional snapshot writer, then
/// runs until a shutdown signal or the runtime limit.
pub async fn app(
    mut shutdown_rx: broadcast::Receiver<()>,
    options: Options,
) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
    let config = match ConfigWrapper::new(options.config_file.clone()) {
        Ok(config) => config,
        Err(err) => {
            let _ = init_logging("info");
            error!("Failed to load config: {:?}", err);
            return Err(err.into());
        }
    };

    if let Err(e) = init_logging(&config.loglevel()) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    info!(
        "n2k-gateway {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );

    let bus = config.bus();
    let transport = Arc::new(HttpBus::new(bus.url(), bus.timeout())?);
    let client = Arc::new(N2kClient::new(transport, config.polling()));

    info!("  Starting client...");
    client.start().await?;

    if options.dump {
        println!("{}", serde_json::to_string_pretty(&client.to_dump_json())?);
        client.stop().await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut writer_handle = None;
    if let Some(path) = config.snapshot_file() {
        info!("  Creating SnapshotWriter...");
        let writer = SnapshotWriter::new(&path)?;
        let devices = client.devices().clone();
        let cancel = cancel.clone();
        writer_handle = Some(tokio::spawn(async move {
            if let Err(e) = writer.start(devices, cancel).await {
                error!("SnapshotWriter task failed: {}", e);
            }
        }));
    }

    info!("Waiting for shutdown signal...");
    match options.runtime {
        Some(secs) => {
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Runtime limit of {}s reached", secs);
                }
            }
        }
        None => {
            let _ = shutdown_rx.recv().await;
        }
    }

    info!("Shutdown signal received, stopping components...");
    cancel.cancel();
    client.stop().await;
    if let Some(handle) = writer_handle {
        if let Err(e) = handle.await {
            error!("Error waiting for snapshot writer task: {}", e);
        }
    }

    info!("Application shutdown complete");
    Ok(())
}
