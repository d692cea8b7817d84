//! Balance sync engine
//!
//! Public facade tying the fetchers, scheduler and resynchronizer together
//! behind one handle.

use super::cache::CacheSnapshotEntry;
use super::error::SyncResult;
use super::fetchers::{PollReport, ResourceFetchers};
use super::listeners::Subscription;
use super::resync::{ResyncReport, Resynchronizer};
use super::scheduler::Scheduler;
use super::source::{AccountProvider, BalanceSource, FixedDelayConfirmer, TransactionConfirmer};
use super::types::{BalanceUpdate, BalanceValue, PollConfig, ResourceType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Keeps one account's balances fresh and republishes changes
pub struct BalanceSync {
    fetchers: Arc<ResourceFetchers>,
    scheduler: Scheduler,
    resync: Arc<Resynchronizer>,
    config: PollConfig,
}

impl BalanceSync {
    /// Create an engine that waits a fixed 5 s after transactions
    pub fn new(
        account: Arc<dyn AccountProvider>,
        source: Arc<dyn BalanceSource>,
        config: PollConfig,
    ) -> Self {
        Self::with_confirmer(
            account,
            source,
            Arc::new(FixedDelayConfirmer::default()),
            config,
        )
    }

    /// Create an engine with a custom transaction confirmer
    pub fn with_confirmer(
        account: Arc<dyn AccountProvider>,
        source: Arc<dyn BalanceSource>,
        confirmer: Arc<dyn TransactionConfirmer>,
        config: PollConfig,
    ) -> Self {
        let fetchers = Arc::new(ResourceFetchers::new(account, source, &config));
        let resync = Arc::new(Resynchronizer::new(
            Arc::clone(&fetchers),
            confirmer,
            config.confirmation_timeout,
        ));

        Self {
            fetchers,
            scheduler: Scheduler::new(config.interval),
            resync,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Begin polling; runs one cycle before returning. No-op if already polling.
    pub async fn start_polling(&self) {
        self.scheduler.start(Arc::clone(&self.fetchers)).await;
    }

    /// Cancel the poll timer. Fetches already running still complete.
    pub fn stop_polling(&self) {
        self.scheduler.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.scheduler.is_polling()
    }

    /// Run a single poll cycle now
    pub async fn poll_once(&self) -> PollReport {
        self.fetchers.poll_all().await
    }

    /// Read-through fetch: cached value if fresh, otherwise a fetch
    pub async fn fetch(
        &self,
        resource: ResourceType,
        account_id: Option<&str>,
    ) -> SyncResult<BalanceValue> {
        self.fetchers.fetch(resource, account_id).await
    }

    /// Fetch a fresh value regardless of the cache
    pub async fn force_refresh(
        &self,
        resource: ResourceType,
        account_id: Option<&str>,
    ) -> SyncResult<BalanceValue> {
        self.fetchers.force_refresh(resource, account_id).await
    }

    /// Cached value, or `None` if absent or stale
    pub fn get_cached_balance(
        &self,
        resource: ResourceType,
        account_id: Option<&str>,
    ) -> Option<BalanceValue> {
        self.fetchers.cached(resource, account_id)
    }

    /// Call `callback` with every freshly fetched value of `resource`
    pub fn add_listener<F>(&self, resource: ResourceType, callback: F) -> Subscription
    where
        F: Fn(&BalanceValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.fetchers.listeners().add_listener(resource, callback)
    }

    /// Stream of every successful fetch
    pub fn subscribe_updates(&self) -> broadcast::Receiver<BalanceUpdate> {
        self.fetchers.listeners().subscribe_updates()
    }

    /// Refresh `resources` once `transaction_id` has settled, in the background
    pub fn refresh_after_transaction(
        &self,
        transaction_id: impl Into<String>,
        resources: Vec<ResourceType>,
    ) -> JoinHandle<ResyncReport> {
        let transaction_id = transaction_id.into();
        tracing::info!(
            transaction_id = %transaction_id,
            resources = ?resources,
            "Scheduling post-transaction resync"
        );
        self.resync.refresh_after_transaction(transaction_id, resources)
    }

    /// Awaitable form of [`refresh_after_transaction`](Self::refresh_after_transaction)
    pub async fn resync_after_transaction(
        &self,
        transaction_id: &str,
        resources: &[ResourceType],
    ) -> ResyncReport {
        self.resync
            .resync_after_transaction(transaction_id, resources)
            .await
    }

    /// Every cached entry, stale ones included
    pub fn cache_snapshot(&self) -> Vec<CacheSnapshotEntry> {
        self.fetchers.cache().snapshot()
    }
}
