//! Test fixtures and coordinator helpers.
//!
//! Provides a fully wired coordinator with an in-process event feed and a
//! shared flush journal.

use crate::store::{FlushLog, MemoryStore};
use std::sync::Arc;
use txscope_core::{
    Config, EventFeed, ExecutionContext, LifecycleEvent, StatsSnapshot, StoreCatalog, StoreKind,
    TransactionId, UnitOfWorkFactory, UnitOfWorkManager,
};

/// A coordinator wired for tests.
pub struct TestHarness {
    /// The manager.
    pub manager: Arc<UnitOfWorkManager>,
    /// A factory over `manager`.
    pub factory: UnitOfWorkFactory,
    /// Every event the manager published.
    pub feed: Arc<EventFeed>,
    /// Flush journal shared by stores created through the harness.
    pub log: FlushLog,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a harness with `config`.
    pub fn with_config(config: Config) -> Self {
        let feed = Arc::new(EventFeed::new());
        let manager = UnitOfWorkManager::builder()
            .config(config)
            .catalog(StoreCatalog::new())
            .event_bus(feed.clone())
            .build();
        let factory = UnitOfWorkFactory::new(Arc::clone(&manager));
        Self {
            manager,
            factory,
            feed,
            log: FlushLog::new(),
        }
    }

    /// Creates a transactional store, journaled and registered under `kind`.
    pub fn memory_store(&self, kind: StoreKind) -> MemoryStore {
        let store = MemoryStore::new(kind);
        self.register(&store);
        store
    }

    /// Journals and registers an existing store.
    pub fn register(&self, store: &MemoryStore) {
        store.attach_log(self.log.clone());
        self.manager.catalog().register_shared(store.as_shared());
    }

    /// Starts a new execution context.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new()
    }

    /// Every published event, oldest first.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.feed.history()
    }

    /// Events published for `id`.
    pub fn events_for(&self, id: TransactionId) -> Vec<LifecycleEvent> {
        self.feed.events_for(id)
    }

    /// Current coordinator statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.manager.stats().snapshot()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` with a freshly wired harness.
///
/// # Example
///
/// ```rust,ignore
/// use txscope_testkit::with_harness;
///
/// #[tokio::test]
/// async fn my_test() {
///     with_harness(|h| async move {
///         let ctx = h.context();
///         let mut uow = h.factory.create(&ctx).await.unwrap();
///         // ...
///     })
///     .await;
/// }
/// ```
pub async fn with_harness<F, Fut, R>(f: F) -> R
where
    F: FnOnce(Arc<TestHarness>) -> Fut,
    Fut: std::future::Future<Output = R>,
{
    f(Arc::new(TestHarness::new())).await
}
