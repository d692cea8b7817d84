//! Grovesync CLI
//!
//! Runs the balance sync engine against the balance API:
//! - Watch balances and print every update
//! - Force-refresh a single balance
//! - Take a one-off snapshot
//! - Resync after a transaction
//! - Generate a default config file

use clap::{Parser, Subcommand};
use grovesync::config::{generate_default_config, Config, LoggingConfig};
use grovesync::sync::{
    BalanceSync, ConnectedAccount, FixedDelayConfirmer, PollConfig, ResourceType,
};
use grovesync::HttpBalanceSource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "grovesync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keep grove account balances in sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Account to track (overrides config)
    #[arg(short, long, global = true)]
    pub account: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll continuously and print every balance update as JSON
    Watch,

    /// Force-refresh one balance and print it
    Fetch {
        /// Resource type (token, usdc, lp_token, revenue, pending_distribution)
        resource: ResourceType,
    },

    /// Run one poll cycle and print every cached balance
    Snapshot,

    /// Wait for a transaction to settle, then refresh the given balances
    Resync {
        /// Transaction id
        transaction_id: String,
        /// Resource types to refresh (default: all)
        #[arg(short, long, value_delimiter = ',')]
        resources: Vec<ResourceType>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)?;
                println!("Wrote default config to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    tracing::info!("Grovesync v{}", env!("CARGO_PKG_VERSION"));

    let account = Arc::new(ConnectedAccount::new());
    if let Some(account_id) = cli.account.clone().or_else(|| config.account.account_id.clone()) {
        account.connect(account_id);
    }

    let source = Arc::new(HttpBalanceSource::new(&config.source));
    tracing::info!("Balance API: {}", source.base_url());

    let confirmer = Arc::new(FixedDelayConfirmer::new(Duration::from_millis(
        config.resync.confirmation_delay_ms,
    )));
    let sync = BalanceSync::with_confirmer(
        account,
        source,
        confirmer,
        PollConfig::from(&config),
    );

    match cli.command {
        Commands::Watch => watch(&sync).await?,
        Commands::Fetch { resource } => {
            let value = sync.force_refresh(resource, None).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Snapshot => {
            let report = sync.poll_once().await;
            if report.is_skipped() {
                anyhow::bail!("No account configured; pass --account or set account.account_id");
            }
            for outcome in report.outcomes.iter().filter(|o| !o.success) {
                eprintln!(
                    "{}: {}",
                    outcome.resource,
                    outcome.error.as_deref().unwrap_or("failed")
                );
            }
            println!("{}", serde_json::to_string_pretty(&sync.cache_snapshot())?);
        }
        Commands::Resync {
            transaction_id,
            resources,
        } => {
            let resources = if resources.is_empty() {
                ResourceType::ALL.to_vec()
            } else {
                resources
            };
            let report = sync
                .resync_after_transaction(&transaction_id, &resources)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

async fn watch(sync: &BalanceSync) -> anyhow::Result<()> {
    let mut updates = sync.subscribe_updates();
    sync.start_polling().await;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => println!("{}", serde_json::to_string(&update)?),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Update stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    sync.stop_polling();
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("grovesync={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
