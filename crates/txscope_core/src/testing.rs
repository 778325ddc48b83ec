//! Minimal store double for unit tests.

use crate::store::{DataStore, FlushScope, StoreError, StoreKind, StoreResult};
use crate::types::TransactionId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Counters {
    flushes: AtomicUsize,
    releases: AtomicUsize,
    fail: AtomicBool,
}

/// Counts flush and release calls.
#[derive(Clone)]
pub(crate) struct CountingStore {
    kind: StoreKind,
    counters: Arc<Counters>,
}

impl CountingStore {
    pub(crate) fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            counters: Arc::default(),
        }
    }

    pub(crate) fn failing(kind: StoreKind) -> Self {
        let store = Self::new(kind);
        store.counters.fail.store(true, Ordering::SeqCst);
        store
    }

    pub(crate) fn shared(kind: StoreKind) -> Arc<dyn DataStore> {
        Self::new(kind).into_shared()
    }

    pub(crate) fn into_shared(self) -> Arc<dyn DataStore> {
        Arc::new(self)
    }

    pub(crate) fn flushes(&self) -> usize {
        self.counters.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for CountingStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn persist_changes(&self, _scope: &FlushScope, _cancel: &CancellationToken) -> StoreResult<()> {
        self.counters.flushes.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail.load(Ordering::SeqCst) {
            return Err(StoreError::backend("constraint violation"));
        }
        Ok(())
    }

    async fn release(&self, _transaction_id: TransactionId) -> StoreResult<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
