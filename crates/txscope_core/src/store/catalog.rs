//! Typed store resolution.

use crate::error::{CoreError, CoreResult};
use crate::store::{DataStore, StoreKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds the store instance used for one transaction.
pub type StoreFactory = Arc<dyn Fn() -> Arc<dyn DataStore> + Send + Sync>;

/// Registry of store kinds the coordinator can resolve.
///
/// Kinds are registered explicitly; resolving an unknown kind fails with
/// [`CoreError::UnsupportedStore`].
#[derive(Default)]
pub struct StoreCatalog {
    factories: RwLock<BTreeMap<StoreKind, StoreFactory>>,
}

impl StoreCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `kind`.
    ///
    /// Returns `false` if the kind was already registered, in which case the
    /// previous factory is replaced.
    pub fn register<F>(&self, kind: StoreKind, factory: F) -> bool
    where
        F: Fn() -> Arc<dyn DataStore> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(kind, Arc::new(factory))
            .is_none()
    }

    /// Registers a single shared store instance under its own kind.
    pub fn register_shared(&self, store: Arc<dyn DataStore>) -> bool {
        let kind = store.kind();
        self.register(kind, move || Arc::clone(&store))
    }

    /// Resolves a fresh store for `kind`.
    pub fn resolve(&self, kind: StoreKind) -> CoreResult<Arc<dyn DataStore>> {
        let factory = self
            .factories
            .read()
            .get(&kind)
            .cloned()
            .ok_or_else(|| CoreError::unsupported_store(kind))?;

        let store = factory();
        if store.kind() != kind {
            tracing::warn!(
                requested = %kind,
                actual = %store.kind(),
                "store factory produced a store of another kind"
            );
        }
        Ok(store)
    }

    /// Checks whether `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: StoreKind) -> bool {
        self.factories.read().contains_key(&kind)
    }

    /// Returns the registered kinds in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<StoreKind> {
        self.factories.read().keys().copied().collect()
    }

    /// Returns the number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Checks whether no kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for StoreCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}
