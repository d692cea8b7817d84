//! Listener registry
//!
//! Per-resource-type subscriber lists. Each callback is invoked under its
//! own guard so one failing subscriber never starves the others. Async
//! consumers can instead follow the broadcast stream of [`BalanceUpdate`]s.

use super::types::{BalanceUpdate, BalanceValue, ResourceType};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Callback invoked with every fresh value of a resource type
pub type ListenerFn = dyn Fn(&BalanceValue) -> anyhow::Result<()> + Send + Sync;

type ListenerMap = HashMap<ResourceType, Vec<(Uuid, Arc<ListenerFn>)>>;

/// Why a single listener invocation failed
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener returned error: {0}")]
    Failed(#[source] anyhow::Error),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

/// Subscriber lists for each resource type
pub struct ListenerRegistry {
    listeners: Arc<Mutex<ListenerMap>>,
    updates_tx: broadcast::Sender<BalanceUpdate>,
}

/// Handle returned by [`ListenerRegistry::add_listener`]
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    resource: ResourceType,
    listeners: Weak<Mutex<ListenerMap>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    /// Remove exactly the callback this handle was issued for
    ///
    /// Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let mut map = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = map.get_mut(&self.resource) else {
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(&self.resource);
        }

        tracing::debug!(resource = %self.resource, listener_id = %self.id, "Listener removed");
        removed
    }
}

impl ListenerRegistry {
    /// Create a registry whose update stream buffers `broadcast_capacity` events
    pub fn new(broadcast_capacity: usize) -> Self {
        let (updates_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            updates_tx,
        }
    }

    /// Register `callback` for `resource`
    pub fn add_listener<F>(&self, resource: ResourceType, callback: F) -> Subscription
    where
        F: Fn(&BalanceValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(resource)
            .or_default()
            .push((id, Arc::new(callback)));

        tracing::debug!(resource = %resource, listener_id = %id, "Listener added");

        Subscription {
            id,
            resource,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Invoke every listener of `resource` with `data`
    ///
    /// Returns the number of listeners that completed without error.
    pub fn notify_listeners(&self, resource: ResourceType, data: &BalanceValue) -> usize {
        // Snapshot so callbacks run without the lock held and may (un)subscribe
        let callbacks: Vec<(Uuid, Arc<ListenerFn>)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&resource)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match invoke_guarded(callback.as_ref(), data) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::error!(
                        resource = %resource,
                        listener_id = %id,
                        error = %e,
                        "Balance listener failed"
                    );
                }
            }
        }

        delivered
    }

    /// Notify listeners of `update.resource` and publish on the update stream
    pub fn publish(&self, update: BalanceUpdate) -> usize {
        let delivered = self.notify_listeners(update.resource, &update.value);
        // No receivers is not an error
        let _ = self.updates_tx.send(update);
        delivered
    }

    /// Receiver for every successful fetch, across all resource types
    pub fn subscribe_updates(&self) -> broadcast::Receiver<BalanceUpdate> {
        self.updates_tx.subscribe()
    }

    /// Number of listeners registered for `resource`
    pub fn listener_count(&self, resource: ResourceType) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&resource)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

fn invoke_guarded(callback: &ListenerFn, data: &BalanceValue) -> Result<(), ListenerError> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(data))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ListenerError::Failed(e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ListenerError::Panicked(message))
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}
