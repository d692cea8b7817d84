//! # Grovesync
//!
//! Grove Balance Sync - keeps a connected account's balances fresh for the
//! grove investment dashboard.
//!
//! ## Features
//!
//! - **Bounded freshness**: TTL cache, read-through on every fetch
//! - **Resilient fetching**: exponential-backoff retries, partial grove failures tolerated
//! - **Observers**: per-resource listeners plus a broadcast update stream
//! - **Polling**: single repeating timer fanning out to all balances
//! - **Post-transaction resync**: targeted refresh once a transaction settles
//!
//! ## Modules
//!
//! - [`sync`]: Cache, retry, listeners, fetchers, scheduler and resync
//! - [`client`]: HTTP balance source
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grovesync::client::HttpBalanceSource;
//! use grovesync::config::SourceConfig;
//! use grovesync::sync::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let account = Arc::new(ConnectedAccount::with_account("0.0.1234"));
//!     let source = Arc::new(HttpBalanceSource::new(&SourceConfig::default()));
//!     let sync = BalanceSync::new(account, source, PollConfig::default());
//!
//!     // Re-render whenever USDC changes
//!     let _sub = sync.add_listener(ResourceType::Usdc, |value| {
//!         println!("USDC: {}", value.total());
//!         Ok(())
//!     });
//!
//!     // Poll now and every 30 seconds
//!     sync.start_polling().await;
//!
//!     // After submitting a transaction, refresh what it touched
//!     sync.refresh_after_transaction("0.0.1234@1700000000.000000001", vec![
//!         ResourceType::Token,
//!         ResourceType::Usdc,
//!     ]);
//!
//!     let usdc = sync.force_refresh(ResourceType::Usdc, None).await?;
//!     println!("Fresh USDC: {}", usdc.total());
//!
//!     sync.stop_polling();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod sync;

// Re-export top-level types for convenience
pub use sync::{
    AccountProvider, BalanceSource, BalanceSync, BalanceUpdate, BalanceValue, ConnectedAccount,
    FixedDelayConfirmer, PollConfig, PollReport, ResourceType, ResyncReport, SourceError,
    Subscription, SyncError, SyncResult, TransactionConfirmer,
};

pub use client::HttpBalanceSource;

pub use config::{Config, ConfigError, LoggingConfig};
