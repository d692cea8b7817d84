//! Collaborator interfaces consumed by the engine
//!
//! The engine never looks these up globally; they are injected at
//! construction time.

use super::error::SourceError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Tells the engine which account, if any, is connected
pub trait AccountProvider: Send + Sync {
    fn is_connected(&self) -> bool;

    fn account_id(&self) -> Option<String>;
}

/// Remote balance data, one method per resource
///
/// Implementations report failures only through [`SourceError`]; the
/// engine does not interpret transport details.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Grove ids the account holds tokens for
    async fn list_groves(&self, account_id: &str) -> Result<Vec<String>, SourceError>;

    /// Token balance of one grove
    async fn grove_token_balance(&self, account_id: &str, grove_id: &str)
        -> Result<u64, SourceError>;

    async fn usdc_balance(&self, account_id: &str) -> Result<u64, SourceError>;

    /// Balance per LP token id
    async fn lp_token_balances(&self, account_id: &str)
        -> Result<BTreeMap<String, u64>, SourceError>;

    async fn revenue_balance(&self, account_id: &str) -> Result<u64, SourceError>;

    async fn pending_distribution(&self, account_id: &str) -> Result<u64, SourceError>;
}

/// Outcome of waiting on a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Ledger reported the transaction as final
    Confirmed,
    /// No ledger check was made; the wait elapsed
    Assumed,
}

/// Blocks until a submitted transaction is likely reflected in balances
#[async_trait]
pub trait TransactionConfirmer: Send + Sync {
    async fn wait_for_confirmation(&self, transaction_id: &str)
        -> Result<Confirmation, SourceError>;
}

/// Confirmer that simply waits a fixed period
#[derive(Debug, Clone)]
pub struct FixedDelayConfirmer {
    delay: Duration,
}

impl FixedDelayConfirmer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelayConfirmer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl TransactionConfirmer for FixedDelayConfirmer {
    async fn wait_for_confirmation(
        &self,
        transaction_id: &str,
    ) -> Result<Confirmation, SourceError> {
        tracing::debug!(
            transaction_id,
            delay_ms = self.delay.as_millis() as u64,
            "Waiting fixed period for transaction to settle"
        );
        tokio::time::sleep(self.delay).await;
        Ok(Confirmation::Assumed)
    }
}

/// In-memory account provider for a single wallet connection
#[derive(Debug, Default)]
pub struct ConnectedAccount {
    account_id: RwLock<Option<String>>,
}

impl ConnectedAccount {
    /// Provider with no account connected
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider already connected to `account_id`
    pub fn with_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: RwLock::new(Some(account_id.into())),
        }
    }

    pub fn connect(&self, account_id: impl Into<String>) {
        let account_id = account_id.into();
        tracing::info!(account_id = %account_id, "Account connected");
        *self.account_id.write().unwrap_or_else(PoisonError::into_inner) = Some(account_id);
    }

    pub fn disconnect(&self) {
        tracing::info!("Account disconnected");
        *self.account_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AccountProvider for ConnectedAccount {
    fn is_connected(&self) -> bool {
        self.account_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn account_id(&self) -> Option<String> {
        self.account_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
