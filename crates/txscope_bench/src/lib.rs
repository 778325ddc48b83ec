//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use txscope_core::{DataStore, StoreKind};
use txscope_testkit::{MemoryStore, STORE_KINDS};

/// Builds a current-thread runtime for driving async benchmarks.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// The first `count` store kinds of the shared pool (at most eight).
pub fn kinds(count: usize) -> Vec<StoreKind> {
    STORE_KINDS.iter().copied().take(count).collect()
}

/// In-memory stores, one per kind.
pub fn memory_stores(count: usize) -> Vec<MemoryStore> {
    kinds(count).into_iter().map(MemoryStore::new).collect()
}

/// Coordinator-facing handles for `stores`.
pub fn shared(stores: &[MemoryStore]) -> Vec<Arc<dyn DataStore>> {
    stores.iter().map(MemoryStore::as_shared).collect()
}
