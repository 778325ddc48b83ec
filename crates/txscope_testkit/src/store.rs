//! In-memory store doubles.
//!
//! [`MemoryStore`] behaves like a transactional backend: writes flushed
//! under an envelope are staged and only become durable when the envelope
//! commits. Writes flushed without an envelope are durable immediately.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use txscope_core::{
    CancellationToken, CoreError, CoreResult, DataStore, EnvelopeId, EnvelopeResource, ExecutionContext,
    FlushScope, StoreError, StoreKind, StoreResult, TransactionId, UnitOfWork, UnitOfWorkManager,
};

/// Shared journal of flush calls across stores, in call order.
#[derive(Debug, Clone, Default)]
pub struct FlushLog {
    entries: Arc<Mutex<Vec<(StoreKind, TransactionId)>>>,
}

impl FlushLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a flush.
    pub fn record(&self, kind: StoreKind, id: TransactionId) {
        self.entries.lock().push((kind, id));
    }

    /// Every recorded flush.
    pub fn entries(&self) -> Vec<(StoreKind, TransactionId)> {
        self.entries.lock().clone()
    }

    /// Kinds flushed for `id`, in call order.
    pub fn kinds_for(&self, id: TransactionId) -> Vec<StoreKind> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, t)| *t == id)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Number of recorded flushes.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Checks if nothing was flushed.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

type Writes = Vec<(String, String)>;

#[derive(Default)]
struct StoreState {
    durable: BTreeMap<String, String>,
    /// Writes recorded but not yet flushed, per transaction.
    pending: HashMap<TransactionId, Writes>,
    /// Writes flushed under an envelope that has not decided yet.
    staged: HashMap<EnvelopeId, Writes>,
}

struct Shared {
    kind: StoreKind,
    transactional: bool,
    state: Mutex<StoreState>,
    journal: RwLock<Option<FlushLog>>,
    flushes: AtomicUsize,
    releases: AtomicUsize,
}

impl EnvelopeResource for Shared {
    fn commit(&self, envelope: EnvelopeId) {
        let mut state = self.state.lock();
        if let Some(writes) = state.staged.remove(&envelope) {
            state.durable.extend(writes);
        }
    }

    fn abort(&self, envelope: EnvelopeId) {
        let discarded = self.state.lock().staged.remove(&envelope).map_or(0, |w| w.len());
        tracing::debug!(store = %self.kind, %envelope, discarded, "staged writes discarded");
    }
}

/// Key/value store kept in memory.
///
/// Clones share the same data, so a test can keep a handle for assertions
/// while the coordinator holds another.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates a transactional store.
    pub fn new(kind: StoreKind) -> Self {
        Self::build(kind, true)
    }

    /// Creates a store that ignores envelopes: every flush is durable.
    pub fn non_transactional(kind: StoreKind) -> Self {
        Self::build(kind, false)
    }

    fn build(kind: StoreKind, transactional: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind,
                transactional,
                state: Mutex::new(StoreState::default()),
                journal: RwLock::new(None),
                flushes: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }),
        }
    }

    /// Records every flush of this store into `log`.
    pub fn attach_log(&self, log: FlushLog) {
        *self.shared.journal.write() = Some(log);
    }

    /// A coordinator-facing handle sharing this store's data.
    pub fn as_shared(&self) -> Arc<dyn DataStore> {
        Arc::new(self.clone())
    }

    /// Enlists with the current unit of work of `ctx` and records a write.
    ///
    /// This is the self-registration path a real adapter follows.
    pub fn put(
        &self,
        manager: &UnitOfWorkManager,
        ctx: &ExecutionContext,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> CoreResult<()> {
        manager.enlist_store(ctx, self.as_shared())?;
        let id = manager
            .current_transaction_id(ctx)
            .ok_or(CoreError::NoActiveUnitOfWork)?;
        self.stage(id, key.into(), value.into());
        Ok(())
    }

    /// Enlists with `uow` and records a write.
    pub fn write(
        &self,
        uow: &UnitOfWork,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> CoreResult<()> {
        uow.enlist(self.as_shared())?;
        self.stage(uow.id(), key.into(), value.into());
        Ok(())
    }

    fn stage(&self, id: TransactionId, key: String, value: String) {
        self.shared
            .state
            .lock()
            .pending
            .entry(id)
            .or_default()
            .push((key, value));
    }

    /// The store kind.
    pub fn kind(&self) -> StoreKind {
        self.shared.kind
    }

    /// Durable value of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.shared.state.lock().durable.get(key).cloned()
    }

    /// Checks if `key` is durable.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.lock().durable.contains_key(key)
    }

    /// Every durable entry.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.shared.state.lock().durable.clone()
    }

    /// Number of durable entries.
    pub fn durable_len(&self) -> usize {
        self.shared.state.lock().durable.len()
    }

    /// Number of unflushed writes recorded for `id`.
    pub fn pending_count(&self, id: TransactionId) -> usize {
        self.shared.state.lock().pending.get(&id).map_or(0, Vec::len)
    }

    /// Number of flushed writes waiting for an envelope outcome.
    pub fn staged_count(&self) -> usize {
        self.shared.state.lock().staged.values().map(Vec::len).sum()
    }

    /// Number of `persist_changes` calls.
    pub fn flush_count(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }

    /// Number of `release` calls.
    pub fn release_count(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("kind", &self.shared.kind)
            .field("transactional", &self.shared.transactional)
            .field("durable", &self.durable_len())
            .finish()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        self.shared.kind
    }

    async fn persist_changes(&self, scope: &FlushScope, cancel: &CancellationToken) -> StoreResult<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.shared.flushes.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = self.shared.journal.read().as_ref() {
            log.record(self.shared.kind, scope.transaction_id());
        }

        let envelope = scope.envelope().filter(|_| self.shared.transactional);
        if let Some(envelope) = envelope {
            let resource: Arc<dyn EnvelopeResource> = self.shared.clone();
            envelope.enlist_resource(resource)?;
        }

        let mut state = self.shared.state.lock();
        let writes = state
            .pending
            .remove(&scope.transaction_id())
            .unwrap_or_default();
        match envelope {
            Some(envelope) => state.staged.entry(envelope.id()).or_default().extend(writes),
            None => state.durable.extend(writes),
        }
        Ok(())
    }

    async fn release(&self, transaction_id: TransactionId) -> StoreResult<()> {
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
        self.shared.state.lock().pending.remove(&transaction_id);
        Ok(())
    }
}

/// Which operation a [`FaultyStore`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `persist_changes` fails.
    Flush,
    /// `release` fails.
    Release,
}

/// A store that fails one operation with a backend error.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    kind: StoreKind,
    fault: Fault,
    message: String,
    flushes: Arc<AtomicUsize>,
}

impl FaultyStore {
    /// Creates a store whose flush fails with `message`.
    pub fn new(kind: StoreKind, message: impl Into<String>) -> Self {
        Self::with_fault(kind, Fault::Flush, message)
    }

    /// Creates a store failing the given operation.
    pub fn with_fault(kind: StoreKind, fault: Fault, message: impl Into<String>) -> Self {
        Self {
            kind,
            fault,
            message: message.into(),
            flushes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A coordinator-facing handle.
    pub fn as_shared(&self) -> Arc<dyn DataStore> {
        Arc::new(self.clone())
    }

    /// Number of `persist_changes` calls.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn persist_changes(&self, _scope: &FlushScope, _cancel: &CancellationToken) -> StoreResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::Flush => Err(StoreError::backend(self.message.clone())),
            Fault::Release => Ok(()),
        }
    }

    async fn release(&self, _transaction_id: TransactionId) -> StoreResult<()> {
        match self.fault {
            Fault::Release => Err(StoreError::backend(self.message.clone())),
            Fault::Flush => Ok(()),
        }
    }
}

/// A store that fires a cancellation token while flushing.
///
/// Used to cancel a commit part-way through its store list.
#[derive(Debug, Clone)]
pub struct CancellingStore {
    kind: StoreKind,
    token: CancellationToken,
}

impl CancellingStore {
    /// Creates a store that cancels `token` when flushed.
    pub fn new(kind: StoreKind, token: CancellationToken) -> Self {
        Self { kind, token }
    }

    /// A coordinator-facing handle.
    pub fn as_shared(&self) -> Arc<dyn DataStore> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl DataStore for CancellingStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn persist_changes(&self, _scope: &FlushScope, _cancel: &CancellationToken) -> StoreResult<()> {
        self.token.cancel();
        Ok(())
    }
}

/// A store whose flush parks until the test opens its gate.
///
/// Lets a test act on other units of work while a commit is mid-flush.
#[derive(Debug, Clone)]
pub struct GatedStore {
    kind: StoreKind,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    flushes: Arc<AtomicUsize>,
}

impl GatedStore {
    /// Creates a closed gate.
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
            flushes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A coordinator-facing handle.
    pub fn as_shared(&self) -> Arc<dyn DataStore> {
        Arc::new(self.clone())
    }

    /// Waits until a flush is parked at the gate.
    pub async fn wait_for_flush(&self) {
        self.entered.notified().await;
    }

    /// Lets the parked flush finish.
    pub fn open(&self) {
        self.gate.notify_one();
    }

    /// Number of flushes that passed the gate.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for GatedStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn persist_changes(&self, _scope: &FlushScope, _cancel: &CancellationToken) -> StoreResult<()> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
