//! Enlistment registry: which stores participated in which transaction.

use crate::error::{CoreError, CoreResult};
use crate::store::{DataStore, StoreKind};
use crate::types::TransactionId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A store enlisted under a transaction.
#[derive(Clone)]
pub struct EnlistedStore {
    kind: StoreKind,
    store: Arc<dyn DataStore>,
}

impl EnlistedStore {
    /// The kind the store enlisted under.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// The store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }
}

impl std::fmt::Debug for EnlistedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EnlistedStore").field(&self.kind).finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<TransactionId, Vec<EnlistedStore>>,
    /// IDs whose entry was removed and whose unit of work is still live.
    retired: HashSet<TransactionId>,
}

/// Concurrent map from transaction ID to its ordered, duplicate-free stores.
///
/// Safe to use from several tasks enlisting into the same transaction at
/// once. Stores are deduplicated by [`StoreKind`]; the first enlistment of a
/// kind fixes its position.
#[derive(Default)]
pub struct EnlistmentRegistry {
    inner: RwLock<RegistryInner>,
}

impl EnlistmentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enlists `store` under `id`.
    ///
    /// Returns `true` if the store was newly added, `false` if a store of the
    /// same kind is already enlisted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionRetired`] if the entry for `id` was
    /// already removed.
    pub fn enlist_data_store(&self, id: TransactionId, store: Arc<dyn DataStore>) -> CoreResult<bool> {
        let kind = store.kind();
        let mut inner = self.inner.write();
        if inner.retired.contains(&id) {
            return Err(CoreError::TransactionRetired { id });
        }

        let stores = inner.entries.entry(id).or_default();
        if stores.iter().any(|s| s.kind == kind) {
            return Ok(false);
        }
        stores.push(EnlistedStore { kind, store });
        tracing::debug!(transaction_id = %id, store = %kind, position = stores.len(), "store enlisted");
        Ok(true)
    }

    /// Returns a snapshot of the stores enlisted under `id`, in enlistment order.
    #[must_use]
    pub fn get_enlisted_data_stores(&self, id: TransactionId) -> Vec<EnlistedStore> {
        self.inner
            .read()
            .entries
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Finds the store of `kind` enlisted under `id`.
    #[must_use]
    pub fn find(&self, id: TransactionId, kind: StoreKind) -> Option<Arc<dyn DataStore>> {
        self.inner
            .read()
            .entries
            .get(&id)?
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.store))
    }

    /// Removes every store enlisted under `id`.
    ///
    /// Returns whether anything was removed. The ID is retired either way.
    pub fn remove_enlisted_data_stores(&self, id: TransactionId) -> bool {
        !self.take_enlisted_data_stores(id).is_empty()
    }

    /// Removes and returns every store enlisted under `id`, retiring the ID.
    pub fn take_enlisted_data_stores(&self, id: TransactionId) -> Vec<EnlistedStore> {
        let mut inner = self.inner.write();
        inner.retired.insert(id);
        inner.entries.remove(&id).unwrap_or_default()
    }

    /// Drops every trace of `id`, retirement included.
    ///
    /// Called once the unit of work is released; from then on nothing can
    /// name `id` as its current transaction.
    pub fn forget(&self, id: TransactionId) -> bool {
        let mut inner = self.inner.write();
        let had_entry = inner.entries.remove(&id).is_some();
        inner.retired.remove(&id) || had_entry
    }

    /// Checks whether `id` no longer accepts enlistments.
    #[must_use]
    pub fn is_retired(&self, id: TransactionId) -> bool {
        self.inner.read().retired.contains(&id)
    }

    /// Number of stores enlisted under `id`.
    #[must_use]
    pub fn store_count(&self, id: TransactionId) -> usize {
        self.inner.read().entries.get(&id).map_or(0, Vec::len)
    }

    /// Number of retired IDs not yet forgotten.
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.inner.read().retired.len()
    }

    /// Number of transactions with a live entry.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.inner.read().entries.len()
    }
}

impl std::fmt::Debug for EnlistmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("EnlistmentRegistry")
            .field("transactions", &inner.entries.len())
            .field("retired", &inner.retired.len())
            .finish()
    }
}
