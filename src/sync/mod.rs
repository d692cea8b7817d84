//! Balance Synchronization
//!
//! Keeps the connected account's balances fresh for the dashboard.
//!
//! ## Architecture
//!
//! - **CacheStore**: TTL cache, staleness checked lazily on read
//! - **RetryPolicy**: bounded exponential backoff around each fetch
//! - **ListenerRegistry**: per-resource callbacks plus an update stream
//! - **ResourceFetchers**: read-through pipelines for the five balances
//! - **Scheduler**: single repeating timer driving poll cycles
//! - **Resynchronizer**: targeted refresh after a transaction settles
//!
//! ## Data Flow
//!
//! 1. Scheduler tick fans out to every resource concurrently
//! 2. Each fetcher serves fresh cache entries without I/O
//! 3. Misses go to the [`BalanceSource`] through the retry policy
//! 4. Successful values are cached and pushed to listeners

mod cache;
mod engine;
mod error;
mod fetchers;
mod inflight;
mod listeners;
mod resync;
mod retry;
mod scheduler;
mod source;
mod types;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, CacheSnapshotEntry, CacheStore};
pub use engine::BalanceSync;
pub use error::{SourceError, SyncError, SyncResult};
pub use fetchers::{PollOutcome, PollReport, ResourceFetchers};
pub use inflight::InflightFetches;
pub use listeners::{ListenerError, ListenerFn, ListenerRegistry, Subscription};
pub use resync::{ResyncConfirmation, ResyncReport, Resynchronizer};
pub use retry::RetryPolicy;
pub use scheduler::{PollCycle, Scheduler};
pub use source::{
    AccountProvider, BalanceSource, Confirmation, ConnectedAccount, FixedDelayConfirmer,
    TransactionConfirmer,
};
pub use types::{BalanceUpdate, BalanceValue, PollConfig, ResourceKey, ResourceType};
