mod config;
mod logging;

use anyhow::Context;
use automount_core::{AutomountError, Leaser, MediaProvider, Muxer, TaskGroup};
use automount_platform::platform_providers;
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "automounter")]
#[command(about = "Mounts removable media on demand and keeps it mounted while leased", long_about = None)]
struct Cli {
    /// Configuration file (defaults to /etc/automounter/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for media and manage leases until interrupted
    Serve,
    /// List media visible to the enabled providers
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::List { json } => list(config, json).await,
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let muxer = Arc::new(Muxer::new(platform_providers(&config.udisks)));
    if muxer.providers().is_empty() {
        tracing::warn!("No media providers enabled, nothing will be mounted");
    }
    let leaser = Arc::new(Leaser::with_config(muxer.clone(), config.leaser.clone()));

    muxer
        .initialize()
        .await
        .context("Failed to initialize media providers")?;

    let cancel = CancellationToken::new();
    let mut group = TaskGroup::new(cancel.clone());

    {
        let leaser = Arc::clone(&leaser);
        let token = group.token();
        group.spawn("leaser", async move { leaser.process(token).await });
    }
    {
        let muxer = Arc::clone(&muxer);
        let token = group.token();
        group.spawn("providers", async move { muxer.run(token).await });
    }
    {
        let token = group.token();
        group.spawn("signals", async move {
            tokio::select! {
                _ = token.cancelled() => {}
                received = shutdown_signal() => {
                    received?;
                    tracing::info!("Shutdown requested");
                    token.cancel();
                }
            }
            Ok(())
        });
    }

    tracing::info!(
        providers = muxer.providers().len(),
        unmount_idle = leaser.config().unmount_idle,
        "automounter running"
    );

    group.wait().await.context("automounter stopped")?;

    let active_leases = leaser.leases().await.len();
    tracing::info!(active_leases, "Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> Result<(), AutomountError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            received = tokio::signal::ctrl_c() => received?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

async fn list(config: Config, json: bool) -> anyhow::Result<()> {
    let muxer = Muxer::new(platform_providers(&config.udisks));
    muxer
        .initialize()
        .await
        .context("Failed to initialize media providers")?;

    let media = muxer.list_media();

    if json {
        println!("{}", serde_json::to_string_pretty(&media)?);
        return Ok(());
    }

    if media.is_empty() {
        println!("No media found.");
    } else {
        println!("Available media:\n");
        for item in media {
            println!("Media: {}", item.display_name);
            println!("  Id: {}", item.id);
            println!();
        }
    }

    Ok(())
}
