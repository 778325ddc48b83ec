//! The unit of work handle.

use super::state::UnitOfWorkState;
use crate::ambient::{AmbientScope, Envelope};
use crate::context::ExecutionContext;
use crate::error::{CoreError, CoreResult};
use crate::events::RollbackCause;
use crate::manager::UnitOfWorkManager;
use crate::store::{DataStore, FlushScope, StoreKind};
use crate::types::{EnvelopeId, IsolationLevel, TransactionId, TransactionMode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a [`UnitOfWork::dispose`] call ended.
#[derive(Debug)]
#[must_use]
pub enum DisposeOutcome {
    /// The unit of work had completed its commit.
    Committed,
    /// The unit of work rolled back.
    RolledBack {
        /// Why it rolled back.
        cause: RollbackCause,
        /// The auto-commit failure that led to the rollback, if any.
        error: Option<CoreError>,
    },
    /// A previous dispose already released the unit of work.
    AlreadyDisposed,
}

impl DisposeOutcome {
    /// Whether the unit of work ended committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, DisposeOutcome::Committed)
    }

    /// Whether the unit of work ended rolled back.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, DisposeOutcome::RolledBack { .. })
    }
}

/// One logical transaction boundary across any number of stores.
///
/// Created by [`UnitOfWorkFactory`](crate::UnitOfWorkFactory), which also
/// makes it the current unit of work of its [`ExecutionContext`]. Stores
/// used while it is current enlist under its ID and are flushed, in
/// enlistment order, by [`commit`](Self::commit).
///
/// Always finish with [`dispose`](Self::dispose). A unit of work dropped
/// without it is still released, but synchronously: its envelope is
/// aborted, its enlisted stores are forgotten without `release` and no
/// event is published.
pub struct UnitOfWork {
    id: TransactionId,
    mode: TransactionMode,
    isolation_level: IsolationLevel,
    auto_complete: bool,
    state: UnitOfWorkState,
    ambient: Option<AmbientScope>,
    manager: Arc<UnitOfWorkManager>,
    context: ExecutionContext,
}

impl UnitOfWork {
    pub(crate) fn new(
        id: TransactionId,
        ambient: AmbientScope,
        auto_complete: bool,
        manager: Arc<UnitOfWorkManager>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            id,
            mode: ambient.mode(),
            isolation_level: ambient.isolation_level(),
            auto_complete,
            state: UnitOfWorkState::Created,
            ambient: Some(ambient),
            manager,
            context,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the isolation level.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Whether dispose attempts a commit when none was attempted.
    #[must_use]
    pub fn auto_complete(&self) -> bool {
        self.auto_complete
    }

    /// Checks if the unit of work was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state == UnitOfWorkState::Disposed
    }

    /// The execution context the unit of work is current in.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// ID of the envelope this unit of work opened or joined.
    ///
    /// `None` for suppressed units of work and after dispose.
    #[must_use]
    pub fn envelope_id(&self) -> Option<EnvelopeId> {
        self.envelope().map(|e| e.id())
    }

    /// Whether this unit of work joined an enclosing envelope.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.ambient.as_ref().is_some_and(AmbientScope::is_joined)
    }

    pub(crate) fn envelope(&self) -> Option<&Arc<Envelope>> {
        self.ambient.as_ref().and_then(AmbientScope::envelope)
    }

    pub(crate) fn set_auto_complete(&mut self, value: bool) {
        self.auto_complete = value;
    }

    /// The scope stores flush under when this unit of work commits.
    #[must_use]
    pub fn flush_scope(&self) -> FlushScope {
        FlushScope::new(self.id, self.isolation_level, self.envelope().cloned())
    }

    fn ensure_not_disposed(&self) -> CoreResult<()> {
        if self.is_disposed() {
            return Err(CoreError::object_disposed(self.id));
        }
        Ok(())
    }

    /// Returns the store of `kind` for this unit of work, enlisting it on
    /// first use.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ObjectDisposed`] after dispose
    /// - [`CoreError::UnsupportedStore`] if `kind` was never registered
    pub fn store(&self, kind: StoreKind) -> CoreResult<Arc<dyn DataStore>> {
        self.ensure_not_disposed()?;
        self.manager.store_for_transaction(self.id, kind)
    }

    /// Enlists `store` under this unit of work.
    ///
    /// Returns whether the store was newly enlisted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectDisposed`] after dispose.
    pub fn enlist(&self, store: Arc<dyn DataStore>) -> CoreResult<bool> {
        self.ensure_not_disposed()?;
        self.manager.registry().enlist_data_store(self.id, store)
    }

    /// Commits the unit of work.
    ///
    /// Flushes every enlisted store in enlistment order, then casts this
    /// unit of work's commit vote on its envelope.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ObjectDisposed`] after dispose
    /// - [`CoreError::InvalidState`] if a commit was already attempted, or
    ///   the envelope was aborted by another participant
    /// - [`CoreError::NoEnlistedStores`] if no store was used
    /// - [`CoreError::Store`] if a backend failed; the unit of work stays in
    ///   [`UnitOfWorkState::CommitAttempted`] and dispose rolls it back
    pub async fn commit(&mut self) -> CoreResult<()> {
        self.commit_with_cancellation(&CancellationToken::new()).await
    }

    /// Commits, honoring `cancel` between store flushes.
    ///
    /// Stores already flushed when cancellation is observed are not
    /// compensated.
    ///
    /// # Errors
    ///
    /// As [`commit`](Self::commit), plus [`CoreError::Cancelled`].
    pub async fn commit_with_cancellation(&mut self, cancel: &CancellationToken) -> CoreResult<()> {
        self.ensure_not_disposed()?;
        if self.state != UnitOfWorkState::Created {
            return Err(CoreError::invalid_state(
                self.id,
                format!("commit not allowed once {}", self.state),
            ));
        }
        if let Some(envelope) = self.envelope().filter(|e| e.is_aborted()) {
            return Err(CoreError::invalid_state(
                self.id,
                format!("ambient envelope {} was aborted by another participant", envelope.id()),
            ));
        }

        self.state.transition(self.id, UnitOfWorkState::CommitAttempted)?;
        tracing::debug!(transaction_id = %self.id, mode = %self.mode, "committing unit of work");

        let result = self.run_commit(cancel).await;
        if let Err(error) = &result {
            self.manager.stats().record_commit_failure();
            tracing::warn!(transaction_id = %self.id, %error, "commit failed");
        }
        result
    }

    async fn run_commit(&mut self, cancel: &CancellationToken) -> CoreResult<()> {
        let manager = Arc::clone(&self.manager);
        manager.commit_unit_of_work(self, cancel).await?;
        manager.complete_unit_of_work(self.id).await;
        self.state.transition(self.id, UnitOfWorkState::Completed)
    }

    /// Casts the commit vote on the envelope, if any.
    pub(crate) fn vote_commit(&mut self) -> CoreResult<()> {
        match self.ambient.as_mut() {
            Some(ambient) => ambient.complete(self.id),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self, cause: RollbackCause, cancel: &CancellationToken) -> CoreResult<()> {
        self.state.transition(self.id, UnitOfWorkState::RolledBack)?;
        if let Some(ambient) = self.ambient.as_mut() {
            ambient.abort();
        }
        self.manager.rollback_unit_of_work(self.id, cause, cancel).await;
        Ok(())
    }

    /// Finishes the unit of work and releases it.
    ///
    /// - completed: nothing further happens
    /// - never committed, auto-complete on: a commit is attempted; if it
    ///   fails the unit of work rolls back and the error is returned inside
    ///   [`DisposeOutcome::RolledBack`]
    /// - otherwise: rolls back
    ///
    /// The ambient scope is released and the execution context frame popped
    /// on every path. A second call returns
    /// [`DisposeOutcome::AlreadyDisposed`].
    ///
    /// # Errors
    ///
    /// Only if the rollback itself is rejected; release still happens.
    pub async fn dispose(&mut self) -> CoreResult<DisposeOutcome> {
        self.dispose_with_cancellation(&CancellationToken::new()).await
    }

    /// Disposes, honoring `cancel` during an auto-commit and while enlisted
    /// stores are released.
    ///
    /// Cancellation never skips the rollback itself or the release of the
    /// ambient scope and context frame; it only stops store I/O that has
    /// not started yet.
    ///
    /// # Errors
    ///
    /// As [`dispose`](Self::dispose).
    pub async fn dispose_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> CoreResult<DisposeOutcome> {
        if self.is_disposed() {
            return Ok(DisposeOutcome::AlreadyDisposed);
        }
        let outcome = self.finish(cancel).await;
        self.release();
        outcome
    }

    async fn finish(&mut self, cancel: &CancellationToken) -> CoreResult<DisposeOutcome> {
        match self.state {
            UnitOfWorkState::Completed => Ok(DisposeOutcome::Committed),
            UnitOfWorkState::Created if self.auto_complete => {
                match self.commit_with_cancellation(cancel).await {
                    Ok(()) => Ok(DisposeOutcome::Committed),
                    Err(error) => {
                        tracing::warn!(
                            transaction_id = %self.id,
                            %error,
                            "auto-commit failed, rolling back"
                        );
                        self.rollback(RollbackCause::CommitFailed, cancel).await?;
                        Ok(DisposeOutcome::RolledBack {
                            cause: RollbackCause::CommitFailed,
                            error: Some(error),
                        })
                    }
                }
            }
            UnitOfWorkState::Created => {
                self.rollback(RollbackCause::NotCommitted, cancel).await?;
                Ok(DisposeOutcome::RolledBack {
                    cause: RollbackCause::NotCommitted,
                    error: None,
                })
            }
            UnitOfWorkState::CommitAttempted => {
                self.rollback(RollbackCause::CommitFailed, cancel).await?;
                Ok(DisposeOutcome::RolledBack {
                    cause: RollbackCause::CommitFailed,
                    error: None,
                })
            }
            UnitOfWorkState::RolledBack | UnitOfWorkState::Disposed => {
                Err(CoreError::invalid_state(self.id, format!("cannot dispose once {}", self.state)))
            }
        }
    }

    fn release(&mut self) {
        // Dropping an unvoted scope aborts its envelope.
        drop(self.ambient.take());
        self.manager.release_unit_of_work(&self.context, self.id);
        self.state = UnitOfWorkState::Disposed;
        tracing::debug!(transaction_id = %self.id, "unit of work disposed");
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("isolation_level", &self.isolation_level)
            .field("state", &self.state)
            .field("envelope", &self.envelope_id())
            .finish()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        drop(self.ambient.take());
        self.manager.abandon_unit_of_work(&self.context, self.id);
        tracing::warn!(
            transaction_id = %self.id,
            state = %self.state,
            "unit of work dropped without dispose"
        );
    }
}
