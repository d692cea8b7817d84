//! In-flight fetch de-duplication
//!
//! A request for a key that is already being fetched joins the running
//! fetch instead of issuing a second call. Every joiner receives the same
//! result, errors included.

use super::error::SourceError;
use super::types::{BalanceValue, ResourceKey};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

type SharedFetch = Shared<BoxFuture<'static, Result<BalanceValue, SourceError>>>;

/// Map of keys to the fetch currently running for them
#[derive(Default)]
pub struct InflightFetches {
    fetches: Mutex<HashMap<ResourceKey, SharedFetch>>,
}

impl InflightFetches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the fetch for `key`, starting it with `start` if none is running
    pub async fn run<F>(&self, key: ResourceKey, start: F) -> Result<BalanceValue, SourceError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<BalanceValue, SourceError>>,
    {
        let fetch = {
            let mut fetches = self.fetches.lock().unwrap_or_else(PoisonError::into_inner);
            match fetches.get(&key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let fetch = start().shared();
                    fetches.insert(key.clone(), fetch.clone());
                    fetch
                }
            }
        };

        let result = fetch.clone().await;

        // Whoever finishes first retires the entry, unless a newer fetch replaced it
        let mut fetches = self.fetches.lock().unwrap_or_else(PoisonError::into_inner);
        if fetches
            .get(&key)
            .map(|current| current.ptr_eq(&fetch))
            .unwrap_or(false)
        {
            fetches.remove(&key);
        }

        result
    }

    /// Number of keys currently being fetched
    pub fn len(&self) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
