//! Resource fetchers
//!
//! One read-through pipeline per resource type:
//!
//! 1. Fresh cache entry → return it (no I/O, no notification)
//! 2. Otherwise fetch through the retry executor, de-duplicated per key
//! 3. On success store in the cache and notify listeners
//! 4. On failure hand the final error to the caller
//!
//! Token balances are a composite: groves are listed first, then each
//! grove's balance is fetched; a grove that fails counts as zero.

use super::cache::CacheStore;
use super::error::{SourceError, SyncError, SyncResult};
use super::inflight::InflightFetches;
use super::listeners::ListenerRegistry;
use super::retry::RetryPolicy;
use super::scheduler::PollCycle;
use super::source::{AccountProvider, BalanceSource};
use super::types::{BalanceUpdate, BalanceValue, PollConfig, ResourceKey, ResourceType};
use async_trait::async_trait;
use futures_util::future::{join_all, FutureExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Capacity of the update broadcast stream
const UPDATE_STREAM_CAPACITY: usize = 256;

/// The five fetch pipelines and the state they share
pub struct ResourceFetchers {
    account: Arc<dyn AccountProvider>,
    source: Arc<dyn BalanceSource>,
    cache: CacheStore,
    listeners: ListenerRegistry,
    retry: RetryPolicy,
    inflight: InflightFetches,
}

/// Result of one resource within a poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub resource: ResourceType,
    pub success: bool,
    pub error: Option<String>,
}

/// Summary of a poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct PollReport {
    /// Account polled; `None` when the cycle was skipped
    pub account_id: Option<String>,
    pub outcomes: Vec<PollOutcome>,
    pub duration_ms: u64,
}

impl PollReport {
    fn skipped() -> Self {
        Self {
            account_id: None,
            outcomes: Vec::new(),
            duration_ms: 0,
        }
    }

    /// True when no account was connected and nothing was fetched
    pub fn is_skipped(&self) -> bool {
        self.account_id.is_none()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

impl ResourceFetchers {
    pub fn new(
        account: Arc<dyn AccountProvider>,
        source: Arc<dyn BalanceSource>,
        config: &PollConfig,
    ) -> Self {
        Self {
            account,
            source,
            cache: CacheStore::new(config.cache_ttl),
            listeners: ListenerRegistry::new(UPDATE_STREAM_CAPACITY),
            retry: RetryPolicy::from_config(config),
            inflight: InflightFetches::new(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Connected account id, if any
    pub fn current_account(&self) -> Option<String> {
        if self.account.is_connected() {
            self.account.account_id()
        } else {
            None
        }
    }

    fn resolve_account(&self, account_id: Option<&str>) -> SyncResult<String> {
        match account_id {
            Some(id) => Ok(id.to_string()),
            None => self.current_account().ok_or(SyncError::NoAccount),
        }
    }

    /// Cached value if still fresh; never triggers a fetch
    pub fn cached(&self, resource: ResourceType, account_id: Option<&str>) -> Option<BalanceValue> {
        let account = self.resolve_account(account_id).ok()?;
        self.cache.get_fresh(&ResourceKey::new(resource, account))
    }

    /// Read-through fetch of one resource
    pub async fn fetch(
        self: &Arc<Self>,
        resource: ResourceType,
        account_id: Option<&str>,
    ) -> SyncResult<BalanceValue> {
        let key = ResourceKey::new(resource, self.resolve_account(account_id)?);

        if let Some(value) = self.cache.get_fresh(&key) {
            tracing::trace!(key = %key, "Balance cache hit");
            return Ok(value);
        }

        self.load(key).await
    }

    /// Fetch one resource, ignoring whatever is cached
    pub async fn force_refresh(
        self: &Arc<Self>,
        resource: ResourceType,
        account_id: Option<&str>,
    ) -> SyncResult<BalanceValue> {
        let key = ResourceKey::new(resource, self.resolve_account(account_id)?);
        self.cache.clear(Some(&key));
        tracing::debug!(key = %key, "Forcing balance refresh");
        self.load(key).await
    }

    /// Poll every resource for the connected account
    ///
    /// Never fails; each resource's error is logged and reported.
    pub async fn poll_all(self: &Arc<Self>) -> PollReport {
        let Some(account) = self.current_account() else {
            tracing::debug!("No account connected, skipping balance poll");
            return PollReport::skipped();
        };

        let start = std::time::Instant::now();
        let results = join_all(ResourceType::ALL.iter().map(|&resource| {
            let account = account.as_str();
            async move { (resource, self.fetch(resource, Some(account)).await) }
        }))
        .await;

        let outcomes: Vec<PollOutcome> = results
            .into_iter()
            .map(|(resource, result)| match result {
                Ok(_) => PollOutcome {
                    resource,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(
                        resource = %resource,
                        account_id = %account,
                        error = %e,
                        "Balance poll failed"
                    );
                    PollOutcome {
                        resource,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        let report = PollReport {
            account_id: Some(account),
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            failures = report.failures(),
            duration_ms = report.duration_ms,
            "Balance poll cycle completed"
        );
        report
    }

    async fn load(self: &Arc<Self>, key: ResourceKey) -> SyncResult<BalanceValue> {
        let fetchers = Arc::clone(self);
        let fetch_key = key.clone();
        let value = self
            .inflight
            .run(key, move || {
                async move { fetchers.fetch_and_publish(fetch_key).await }.boxed()
            })
            .await?;
        Ok(value)
    }

    async fn fetch_and_publish(&self, key: ResourceKey) -> Result<BalanceValue, SourceError> {
        let value = self.fetch_from_source(&key).await?;

        self.cache.set(key.clone(), value.clone());
        self.listeners.publish(BalanceUpdate {
            resource: key.resource,
            account_id: key.account_id.clone(),
            value: value.clone(),
            fetched_at: chrono::Utc::now(),
        });

        Ok(value)
    }

    async fn fetch_from_source(&self, key: &ResourceKey) -> Result<BalanceValue, SourceError> {
        let source = self.source.as_ref();
        let account = key.account_id.as_str();
        let label = key.to_string();

        match key.resource {
            ResourceType::Token => self.fetch_grove_tokens(account).await,
            ResourceType::Usdc => self
                .retry
                .retry_fetch(&label, || source.usdc_balance(account))
                .await
                .map(BalanceValue::Amount),
            ResourceType::LpToken => self
                .retry
                .retry_fetch(&label, || source.lp_token_balances(account))
                .await
                .map(BalanceValue::LpTokens),
            ResourceType::Revenue => self
                .retry
                .retry_fetch(&label, || source.revenue_balance(account))
                .await
                .map(BalanceValue::Amount),
            ResourceType::PendingDistribution => self
                .retry
                .retry_fetch(&label, || source.pending_distribution(account))
                .await
                .map(BalanceValue::Amount),
        }
    }

    async fn fetch_grove_tokens(&self, account: &str) -> Result<BalanceValue, SourceError> {
        let source = self.source.as_ref();
        let groves = self
            .retry
            .retry_fetch(&format!("groves_{}", account), || source.list_groves(account))
            .await?;

        let balances = join_all(groves.iter().map(|grove| async move {
            let label = format!("token_{}_{}", account, grove);
            let balance = match self
                .retry
                .retry_fetch(&label, || source.grove_token_balance(account, grove))
                .await
            {
                Ok(balance) => balance,
                Err(e) => {
                    tracing::warn!(
                        account_id = %account,
                        grove_id = %grove,
                        error = %e,
                        "Grove balance unavailable, counting as zero"
                    );
                    0
                }
            };
            (grove.clone(), balance)
        }))
        .await;

        Ok(BalanceValue::Groves(balances.into_iter().collect::<BTreeMap<_, _>>()))
    }
}

#[async_trait]
impl PollCycle for ResourceFetchers {
    async fn poll_cycle(self: Arc<Self>) {
        self.poll_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::source::ConnectedAccount;
    use crate::sync::testing::MockSource;
    use std::time::Duration;

    const ACCOUNT: &str = "0.0.1234";

    fn fetchers(source: Arc<MockSource>) -> Arc<ResourceFetchers> {
        let account = Arc::new(ConnectedAccount::with_account(ACCOUNT));
        Arc::new(ResourceFetchers::new(account, source, &PollConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_within_ttl_hits_cache() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Ok(250));
        let fetchers = fetchers(Arc::clone(&source));

        let first = fetchers.fetch(ResourceType::Usdc, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = fetchers.fetch(ResourceType::Usdc, None).await.unwrap();

        assert_eq!(first, BalanceValue::Amount(250));
        assert_eq!(second, first);
        assert_eq!(source.calls("usdc"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_after_ttl_goes_to_source() {
        let source = Arc::new(MockSource::new());
        source.set_revenue(Ok(5));
        let fetchers = fetchers(Arc::clone(&source));

        fetchers.fetch(ResourceType::Revenue, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        source.set_revenue(Ok(6));
        let value = fetchers.fetch(ResourceType::Revenue, None).await.unwrap();

        assert_eq!(value, BalanceValue::Amount(6));
        assert_eq!(source.calls("revenue"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_always_calls_source() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Ok(1));
        let fetchers = fetchers(Arc::clone(&source));

        fetchers.fetch(ResourceType::Usdc, None).await.unwrap();
        source.set_usdc(Ok(2));
        let value = fetchers.force_refresh(ResourceType::Usdc, None).await.unwrap();

        assert_eq!(value, BalanceValue::Amount(2));
        assert_eq!(source.calls("usdc"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_does_not_notify() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Ok(1));
        let fetchers = fetchers(Arc::clone(&source));
        let mut updates = fetchers.listeners().subscribe_updates();

        fetchers.fetch(ResourceType::Usdc, None).await.unwrap();
        fetchers.fetch(ResourceType::Usdc, None).await.unwrap();

        assert!(updates.try_recv().is_ok());
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grove_failure_counts_as_zero() {
        let source = Arc::new(MockSource::new());
        source.set_groves(&["grove1", "grove2", "grove3"]);
        source.set_grove_balance("grove1", Ok(10));
        source.set_grove_balance("grove2", Err(SourceError::Network("reset".into())));
        source.set_grove_balance("grove3", Ok(30));
        let fetchers = fetchers(Arc::clone(&source));

        let value = fetchers.fetch(ResourceType::Token, None).await.unwrap();

        let groves = value.as_groves().unwrap();
        assert_eq!(groves.len(), 3);
        assert_eq!(groves["grove1"], 10);
        assert_eq!(groves["grove2"], 0);
        assert_eq!(groves["grove3"], 30);
        // grove2 was retried to exhaustion
        assert_eq!(source.calls("grove:grove2"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grove_listing_failure_fails_token_fetch() {
        let source = Arc::new(MockSource::new());
        source.fail_groves(SourceError::Upstream("503".into()));
        let fetchers = fetchers(Arc::clone(&source));

        let result = fetchers.fetch(ResourceType::Token, None).await;

        assert_eq!(
            result,
            Err(SyncError::Source(SourceError::Upstream("503".into())))
        );
        assert!(fetchers.cached(ResourceType::Token, None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_propagate_original_error() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Err(SourceError::Network("unreachable".into())));
        let fetchers = fetchers(Arc::clone(&source));

        let result = fetchers.fetch(ResourceType::Usdc, None).await;

        assert_eq!(
            result,
            Err(SyncError::Source(SourceError::Network("unreachable".into())))
        );
        assert_eq!(source.calls("usdc"), 3);
    }

    #[tokio::test]
    async fn test_no_account_is_an_error_for_direct_calls() {
        let source = Arc::new(MockSource::new());
        let fetchers = Arc::new(ResourceFetchers::new(
            Arc::new(ConnectedAccount::new()),
            source,
            &PollConfig::default(),
        ));

        let result = fetchers.force_refresh(ResourceType::Usdc, None).await;
        assert_eq!(result, Err(SyncError::NoAccount));
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_override() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Ok(3));
        let fetchers = fetchers(Arc::clone(&source));

        fetchers.fetch(ResourceType::Usdc, Some("0.0.42")).await.unwrap();

        assert!(fetchers.cached(ResourceType::Usdc, Some("0.0.42")).is_some());
        assert!(fetchers.cached(ResourceType::Usdc, None).is_none());
        assert_eq!(source.accounts_seen(), vec!["0.0.42".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_all_isolates_failures() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Err(SourceError::Timeout));
        let fetchers = fetchers(Arc::clone(&source));

        let report = fetchers.poll_all().await;

        assert!(!report.is_skipped());
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.failures(), 1);
        assert!(fetchers.cached(ResourceType::Revenue, None).is_some());
        assert!(fetchers.cached(ResourceType::Usdc, None).is_none());
    }

    #[tokio::test]
    async fn test_poll_all_skips_without_account() {
        let source = Arc::new(MockSource::new());
        let fetchers = Arc::new(ResourceFetchers::new(
            Arc::new(ConnectedAccount::new()),
            Arc::clone(&source) as Arc<dyn BalanceSource>,
            &PollConfig::default(),
        ));

        let report = fetchers.poll_all().await;

        assert!(report.is_skipped());
        assert_eq!(source.total_calls(), 0);
        assert!(fetchers.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_force_refresh_shares_call() {
        let source = Arc::new(MockSource::new());
        source.set_usdc(Ok(9));
        source.set_latency(Duration::from_millis(200));
        let fetchers = fetchers(Arc::clone(&source));

        let (a, b) = tokio::join!(
            fetchers.force_refresh(ResourceType::Usdc, None),
            fetchers.force_refresh(ResourceType::Usdc, None),
        );

        assert_eq!(a, Ok(BalanceValue::Amount(9)));
        assert_eq!(b, Ok(BalanceValue::Amount(9)));
        assert_eq!(source.calls("usdc"), 1);
    }
}
