//! Post-mutation resynchronizer
//!
//! After a state-changing transaction, waits for the confirmer and then
//! force-refreshes the affected resources. Best effort: confirmation
//! failures and refresh failures are logged, never raised.

use super::error::SyncError;
use super::fetchers::ResourceFetchers;
use super::source::{Confirmation, TransactionConfirmer};
use super::types::ResourceType;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a resync achieved
#[derive(Debug, Clone, Serialize)]
pub struct ResyncReport {
    pub transaction_id: String,
    /// `None` when the confirmer failed or timed out
    pub confirmation: Option<ResyncConfirmation>,
    pub refreshed: Vec<ResourceType>,
    pub failed: Vec<(ResourceType, String)>,
}

/// Serializable mirror of [`Confirmation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncConfirmation {
    Confirmed,
    Assumed,
}

impl From<Confirmation> for ResyncConfirmation {
    fn from(c: Confirmation) -> Self {
        match c {
            Confirmation::Confirmed => ResyncConfirmation::Confirmed,
            Confirmation::Assumed => ResyncConfirmation::Assumed,
        }
    }
}

pub struct Resynchronizer {
    fetchers: Arc<ResourceFetchers>,
    confirmer: Arc<dyn TransactionConfirmer>,
    confirmation_timeout: Duration,
}

impl Resynchronizer {
    pub fn new(
        fetchers: Arc<ResourceFetchers>,
        confirmer: Arc<dyn TransactionConfirmer>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            fetchers,
            confirmer,
            confirmation_timeout,
        }
    }

    /// Wait for `transaction_id` to settle, then refresh `resources`
    ///
    /// The account is captured before waiting so a disconnect during the
    /// wait does not redirect the refresh. With no account connected at call
    /// time nothing is refreshed and every resource fails with `NoAccount`.
    pub async fn resync_after_transaction(
        &self,
        transaction_id: &str,
        resources: &[ResourceType],
    ) -> ResyncReport {
        let Some(account) = self.fetchers.current_account() else {
            tracing::warn!(transaction_id, "No account connected, skipping resync");
            let reason = SyncError::NoAccount.to_string();
            return ResyncReport {
                transaction_id: transaction_id.to_string(),
                confirmation: None,
                refreshed: Vec::new(),
                failed: resources.iter().map(|&r| (r, reason.clone())).collect(),
            };
        };

        let confirmation = match tokio::time::timeout(
            self.confirmation_timeout,
            self.confirmer.wait_for_confirmation(transaction_id),
        )
        .await
        {
            Ok(Ok(confirmation)) => Some(confirmation.into()),
            Ok(Err(e)) => {
                tracing::warn!(
                    transaction_id,
                    error = %e,
                    "Transaction confirmation failed, refreshing anyway"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    transaction_id,
                    timeout_ms = self.confirmation_timeout.as_millis() as u64,
                    "Transaction confirmation timed out, refreshing anyway"
                );
                None
            }
        };

        let results = join_all(resources.iter().map(|&resource| {
            let account = Some(account.as_str());
            async move {
                (
                    resource,
                    self.fetchers.force_refresh(resource, account).await,
                )
            }
        }))
        .await;

        let mut report = ResyncReport {
            transaction_id: transaction_id.to_string(),
            confirmation,
            refreshed: Vec::new(),
            failed: Vec::new(),
        };

        for (resource, result) in results {
            match result {
                Ok(_) => report.refreshed.push(resource),
                Err(e) => {
                    tracing::warn!(
                        transaction_id,
                        resource = %resource,
                        error = %e,
                        "Post-transaction refresh failed"
                    );
                    report.failed.push((resource, e.to_string()));
                }
            }
        }

        tracing::info!(
            transaction_id,
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Post-transaction resync finished"
        );
        report
    }

    /// Fire-and-forget form of [`resync_after_transaction`](Self::resync_after_transaction)
    pub fn refresh_after_transaction(
        self: &Arc<Self>,
        transaction_id: impl Into<String>,
        resources: Vec<ResourceType>,
    ) -> JoinHandle<ResyncReport> {
        let resync = Arc::clone(self);
        let transaction_id = transaction_id.into();
        tokio::spawn(async move {
            resync
                .resync_after_transaction(&transaction_id, &resources)
                .await
        })
    }
}
