//! Scriptable balance source shared by the engine tests

use super::error::SourceError;
use super::source::BalanceSource;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    groves: Option<Result<Vec<String>, SourceError>>,
    grove_balances: HashMap<String, Result<u64, SourceError>>,
    usdc: Option<Result<u64, SourceError>>,
    lp_tokens: Option<Result<BTreeMap<String, u64>, SourceError>>,
    revenue: Option<Result<u64, SourceError>>,
    pending: Option<Result<u64, SourceError>>,
    latency: Duration,
    calls: HashMap<String, usize>,
    accounts: BTreeSet<String>,
}

/// In-memory [`BalanceSource`] that counts calls
///
/// Unset resources answer with zero / empty values.
#[derive(Default)]
pub struct MockSource {
    state: Mutex<MockState>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_groves(&self, groves: &[&str]) {
        self.state.lock().unwrap().groves =
            Some(Ok(groves.iter().map(|g| g.to_string()).collect()));
    }

    pub fn fail_groves(&self, error: SourceError) {
        self.state.lock().unwrap().groves = Some(Err(error));
    }

    pub fn set_grove_balance(&self, grove: &str, result: Result<u64, SourceError>) {
        self.state
            .lock()
            .unwrap()
            .grove_balances
            .insert(grove.to_string(), result);
    }

    pub fn set_usdc(&self, result: Result<u64, SourceError>) {
        self.state.lock().unwrap().usdc = Some(result);
    }

    pub fn set_lp_tokens(&self, result: Result<BTreeMap<String, u64>, SourceError>) {
        self.state.lock().unwrap().lp_tokens = Some(result);
    }

    pub fn set_revenue(&self, result: Result<u64, SourceError>) {
        self.state.lock().unwrap().revenue = Some(result);
    }

    pub fn set_pending(&self, result: Result<u64, SourceError>) {
        self.state.lock().unwrap().pending = Some(result);
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    /// Calls made to `name` ("groves", "grove:<id>", "usdc", "lp_token", "revenue", "pending_distribution")
    pub fn calls(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn accounts_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().accounts.iter().cloned().collect()
    }

    async fn record<T>(
        &self,
        name: String,
        account_id: &str,
        pick: impl FnOnce(&MockState) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        let (latency, result) = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(name).or_default() += 1;
            state.accounts.insert(account_id.to_string());
            (state.latency, pick(&state))
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

#[async_trait]
impl BalanceSource for MockSource {
    async fn list_groves(&self, account_id: &str) -> Result<Vec<String>, SourceError> {
        self.record("groves".into(), account_id, |s| {
            s.groves.clone().unwrap_or_else(|| Ok(Vec::new()))
        })
        .await
    }

    async fn grove_token_balance(
        &self,
        account_id: &str,
        grove_id: &str,
    ) -> Result<u64, SourceError> {
        self.record(format!("grove:{}", grove_id), account_id, |s| {
            s.grove_balances.get(grove_id).cloned().unwrap_or(Ok(0))
        })
        .await
    }

    async fn usdc_balance(&self, account_id: &str) -> Result<u64, SourceError> {
        self.record("usdc".into(), account_id, |s| s.usdc.clone().unwrap_or(Ok(0)))
            .await
    }

    async fn lp_token_balances(
        &self,
        account_id: &str,
    ) -> Result<BTreeMap<String, u64>, SourceError> {
        self.record("lp_token".into(), account_id, |s| {
            s.lp_tokens.clone().unwrap_or_else(|| Ok(BTreeMap::new()))
        })
        .await
    }

    async fn revenue_balance(&self, account_id: &str) -> Result<u64, SourceError> {
        self.record("revenue".into(), account_id, |s| {
            s.revenue.clone().unwrap_or(Ok(0))
        })
        .await
    }

    async fn pending_distribution(&self, account_id: &str) -> Result<u64, SourceError> {
        self.record("pending_distribution".into(), account_id, |s| {
            s.pending.clone().unwrap_or(Ok(0))
        })
        .await
    }
}
