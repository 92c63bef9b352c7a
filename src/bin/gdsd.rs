//! GDS daemon - serves the registration API and runs the certificate
//! manager against the configured store, vault, CA, and mail relay.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gds::adapters::{FileDirectoryStore, FileSecretVault, SectigoClient, SmtpMailTransport};
use gds::certman::CertificateManager;
use gds::config::Config;
use gds::courier::EmailCourier;
use gds::registry::Registry;
use gds::server;

#[derive(Parser)]
#[command(name = "gdsd")]
#[command(about = "TRISA Global Directory Service daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the registration API and the certificate manager
    Serve,

    /// Write an example configuration file
    Config {
        /// Where to write the example configuration
        #[arg(short, long, default_value = "gds.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve(cli.config).await,
        Commands::Config { output } => {
            Config::create_example(&output)?;
            println!("example configuration written to {}", output.display());
            Ok(())
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };
    config.validate()?;

    if !config.gds.enabled {
        warn!("the registration API is disabled by configuration, exiting");
        return Ok(());
    }

    let store = Arc::new(FileDirectoryStore::new(config.gds.data_dir.join("store")).await?);
    let vault = Arc::new(FileSecretVault::new(config.gds.data_dir.join("secrets")).await?);
    let transport = Arc::new(SmtpMailTransport::new(&config.email)?);
    let courier = EmailCourier::new(transport);

    let registry = Arc::new(Registry::new(
        store.clone(),
        vault.clone(),
        courier.clone(),
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let manager_handle = if config.certman.enabled {
        let ca = Arc::new(SectigoClient::new(
            &config.sectigo,
            config.certman.request_timeout(),
        )?);
        let manager = CertificateManager::new(store, vault, ca, courier, &config.certman);
        Some(tokio::spawn(manager.run(shutdown_rx)))
    } else {
        info!("certificate manager is disabled by configuration");
        None
    };

    let listener = tokio::net::TcpListener::bind(&config.gds.bind_addr).await?;
    info!(addr = %config.gds.bind_addr, directory = %config.directory_id, "gds listening");

    axum::serve(listener, server::router(registry))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // stop the manager and surface any contract violation it halted on
    let _ = shutdown_tx.send(true);
    if let Some(handle) = manager_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "certificate manager exited with error"),
            Err(e) => error!(error = %e, "certificate manager task panicked"),
        }
    }
    Ok(())
}
