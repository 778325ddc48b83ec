//! Unit of work manager.

use crate::config::Config;
use crate::context::{ExecutionContext, Frame};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBus, LifecycleEvent, NullEventBus, RollbackCause};
use crate::registry::{EnlistedStore, EnlistmentRegistry};
use crate::stats::CoordinatorStats;
use crate::store::{DataStore, StoreCatalog, StoreKind};
use crate::types::TransactionId;
use crate::unit_of_work::UnitOfWork;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Coordinates commit, rollback and completion of units of work.
///
/// The manager provides:
/// - The "current unit of work" of each [`ExecutionContext`]
/// - Store enlistment through the [`EnlistmentRegistry`]
/// - Ordered flush orchestration at commit
/// - Lifecycle event publication
///
/// One manager is shared (as an `Arc`) by every flow of a process; it holds
/// no per-flow state itself.
pub struct UnitOfWorkManager {
    config: Config,
    catalog: StoreCatalog,
    registry: EnlistmentRegistry,
    event_bus: Arc<dyn EventBus>,
    stats: CoordinatorStats,
}

impl UnitOfWorkManager {
    /// Creates a manager.
    pub fn new(config: Config, catalog: StoreCatalog, event_bus: Arc<dyn EventBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            catalog,
            registry: EnlistmentRegistry::new(),
            event_bus,
            stats: CoordinatorStats::new(),
        })
    }

    /// Starts building a manager.
    pub fn builder() -> UnitOfWorkManagerBuilder {
        UnitOfWorkManagerBuilder::default()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store catalog.
    pub fn catalog(&self) -> &StoreCatalog {
        &self.catalog
    }

    /// Returns the enlistment registry.
    pub fn registry(&self) -> &EnlistmentRegistry {
        &self.registry
    }

    /// Returns the statistics.
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Records `uow` as the current unit of work of `ctx`.
    ///
    /// Always succeeds.
    pub fn enlist_unit_of_work(&self, ctx: &ExecutionContext, uow: &UnitOfWork) -> bool {
        ctx.push(Frame {
            transaction_id: uow.id(),
            envelope: uow.envelope().cloned(),
        });
        tracing::info!(
            flow_id = %ctx.flow_id(),
            transaction_id = %uow.id(),
            mode = %uow.mode(),
            isolation = %uow.isolation_level(),
            depth = ctx.depth(),
            "unit of work enlisted"
        );
        true
    }

    /// ID of the current unit of work of `ctx`.
    pub fn current_transaction_id(&self, ctx: &ExecutionContext) -> Option<TransactionId> {
        ctx.current_transaction_id()
    }

    /// Whether `ctx` has a current unit of work.
    pub fn is_unit_of_work_active(&self, ctx: &ExecutionContext) -> bool {
        ctx.is_active()
    }

    /// Enlists `store` under the current unit of work of `ctx`.
    ///
    /// This is how a backend self-registers the first time it is used
    /// inside a transaction. Returns whether the store was newly enlisted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoActiveUnitOfWork`] outside of any unit of work.
    pub fn enlist_store(&self, ctx: &ExecutionContext, store: Arc<dyn DataStore>) -> CoreResult<bool> {
        let id = ctx.current_transaction_id().ok_or(CoreError::NoActiveUnitOfWork)?;
        self.registry.enlist_data_store(id, store)
    }

    /// Returns the store of `kind` for the current unit of work of `ctx`,
    /// resolving and enlisting it on first use.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoActiveUnitOfWork`] outside of any unit of work
    /// - [`CoreError::UnsupportedStore`] if `kind` was never registered
    pub fn store(&self, ctx: &ExecutionContext, kind: StoreKind) -> CoreResult<Arc<dyn DataStore>> {
        let id = ctx.current_transaction_id().ok_or(CoreError::NoActiveUnitOfWork)?;
        self.store_for_transaction(id, kind)
    }

    pub(crate) fn store_for_transaction(
        &self,
        id: TransactionId,
        kind: StoreKind,
    ) -> CoreResult<Arc<dyn DataStore>> {
        if let Some(store) = self.registry.find(id, kind) {
            return Ok(store);
        }

        let store = self.catalog.resolve(kind)?;
        if self.registry.enlist_data_store(id, Arc::clone(&store))? {
            return Ok(store);
        }
        // Lost a race with a concurrent enlistment of the same kind.
        Ok(self.registry.find(id, kind).unwrap_or(store))
    }

    /// Flushes every store enlisted under `uow`, in enlistment order, then
    /// casts its commit vote.
    ///
    /// Only once the vote is accepted is the registry entry removed, the
    /// stores released and a `Committed` event published.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoEnlistedStores`] if nothing enlisted
    /// - [`CoreError::Cancelled`] if `cancel` fired before every store flushed
    /// - [`CoreError::Store`] if a backend failed
    /// - [`CoreError::InvalidState`] if another participant aborted the
    ///   envelope while the stores were flushing
    pub async fn commit_unit_of_work(
        &self,
        uow: &mut UnitOfWork,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        let id = uow.id();
        let stores = self.registry.get_enlisted_data_stores(id);
        if stores.is_empty() {
            return Err(CoreError::no_enlisted_stores(id));
        }

        let scope = uow.flush_scope();
        for (flushed, enlisted) in stores.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(transaction_id = %id, flushed, "commit cancelled");
                return Err(CoreError::Cancelled {
                    id,
                    flushed,
                    remaining: stores.len() - flushed,
                });
            }
            enlisted
                .store()
                .persist_changes(&scope, cancel)
                .await
                .map_err(|source| CoreError::store(id, enlisted.kind(), source))?;
            self.stats.record_store_flush();
            tracing::debug!(transaction_id = %id, store = %enlisted.kind(), "store flushed");
        }

        uow.vote_commit()?;

        let stores = self.registry.take_enlisted_data_stores(id);
        self.release_stores(id, &stores, cancel).await;
        self.stats.record_commit();
        self.publish(LifecycleEvent::Committed { transaction_id: id }).await;
        Ok(())
    }

    /// Abandons the writes of `id` and publishes a `RolledBack` event.
    ///
    /// No store is flushed. Enlisted stores are released until `cancel`
    /// fires.
    pub async fn rollback_unit_of_work(
        &self,
        id: TransactionId,
        cause: RollbackCause,
        cancel: &CancellationToken,
    ) {
        let stores = self.registry.take_enlisted_data_stores(id);
        self.release_stores(id, &stores, cancel).await;
        self.stats.record_rollback();
        tracing::info!(transaction_id = %id, ?cause, stores = stores.len(), "unit of work rolled back");
        self.publish(LifecycleEvent::RolledBack {
            transaction_id: id,
            cause,
        })
        .await;
    }

    /// Clears any residual registry entry of `id` and publishes a
    /// `Completed` event.
    pub async fn complete_unit_of_work(&self, id: TransactionId) {
        if self.registry.remove_enlisted_data_stores(id) {
            tracing::debug!(transaction_id = %id, "removed residual enlistments");
        }
        tracing::info!(transaction_id = %id, "unit of work completed");
        self.publish(LifecycleEvent::Completed { transaction_id: id }).await;
    }

    /// Pops the frame of `id` from `ctx` and forgets it in the registry.
    pub(crate) fn release_unit_of_work(&self, ctx: &ExecutionContext, id: TransactionId) {
        if !ctx.remove(id) {
            tracing::debug!(transaction_id = %id, "no context frame to release");
        }
        self.registry.forget(id);
    }

    /// Synchronous release for a unit of work dropped without dispose.
    pub(crate) fn abandon_unit_of_work(&self, ctx: &ExecutionContext, id: TransactionId) {
        let stores = self.registry.take_enlisted_data_stores(id);
        if !stores.is_empty() {
            tracing::warn!(
                transaction_id = %id,
                stores = stores.len(),
                "enlisted stores abandoned without release"
            );
        }
        ctx.remove(id);
        self.registry.forget(id);
        self.stats.record_abandoned();
    }

    async fn release_stores(
        &self,
        id: TransactionId,
        stores: &[EnlistedStore],
        cancel: &CancellationToken,
    ) {
        for (released, enlisted) in stores.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    transaction_id = %id,
                    released,
                    skipped = stores.len() - released,
                    "store release cancelled"
                );
                return;
            }
            if let Err(error) = enlisted.store().release(id).await {
                tracing::warn!(
                    transaction_id = %id,
                    store = %enlisted.kind(),
                    %error,
                    "store release failed"
                );
            }
        }
    }

    pub(crate) async fn publish(&self, event: LifecycleEvent) {
        tracing::trace!(
            event = event.name(),
            transaction_id = %event.transaction_id(),
            "publishing lifecycle event"
        );
        self.event_bus.publish(event).await;
        self.stats.record_event();
    }
}

impl std::fmt::Debug for UnitOfWorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWorkManager")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Builder for [`UnitOfWorkManager`].
#[derive(Default)]
pub struct UnitOfWorkManagerBuilder {
    config: Config,
    catalog: StoreCatalog,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl UnitOfWorkManagerBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the store catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: StoreCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the event bus. Defaults to [`NullEventBus`].
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Builds the manager.
    pub fn build(self) -> Arc<UnitOfWorkManager> {
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(NullEventBus) as Arc<dyn EventBus>);
        UnitOfWorkManager::new(self.config, self.catalog, event_bus)
    }
}
