//! The contract every persistence backend adapter implements.

use crate::ambient::{Envelope, EnvelopeStatus};
use crate::types::{EnvelopeId, IsolationLevel, TransactionId};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a backend adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("backend error: {message}")]
    Backend {
        /// Backend-provided description.
        message: String,
    },

    /// The envelope the flush runs under is no longer active.
    #[error("ambient envelope {envelope} is {status}")]
    EnvelopeClosed {
        /// The envelope.
        envelope: EnvelopeId,
        /// Its terminal status.
        status: EnvelopeStatus,
    },

    /// The backend observed cancellation mid-flush.
    #[error("flush cancelled")]
    Cancelled,

    /// Any other backend error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Stable tag identifying a kind of store.
///
/// Chosen explicitly at registration time. Two stores with the same kind
/// are the same participant as far as enlistment is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StoreKind(&'static str);

impl StoreKind {
    /// Creates a store kind tag.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What a store needs to know while flushing.
///
/// When `envelope` is `None` the flush runs outside any ambient context and
/// whatever the store writes is durable as soon as the call returns.
#[derive(Debug, Clone)]
pub struct FlushScope {
    transaction_id: TransactionId,
    isolation_level: IsolationLevel,
    envelope: Option<Arc<Envelope>>,
}

impl FlushScope {
    /// Creates a flush scope.
    pub fn new(
        transaction_id: TransactionId,
        isolation_level: IsolationLevel,
        envelope: Option<Arc<Envelope>>,
    ) -> Self {
        Self {
            transaction_id,
            isolation_level,
            envelope,
        }
    }

    /// The unit of work being committed.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Isolation level of the unit of work.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// The envelope writes should be staged under, if any.
    #[must_use]
    pub fn envelope(&self) -> Option<&Arc<Envelope>> {
        self.envelope.as_ref()
    }

    /// Whether the flush participates in an ambient envelope.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.envelope.is_some()
    }
}

/// A persistence backend adapter.
///
/// Adapters enlist themselves with the
/// [`UnitOfWorkManager`](crate::UnitOfWorkManager) the first time they are
/// used inside a transaction; the coordinator never discovers them.
///
/// # Invariants
///
/// - `persist_changes` is called at most once per transaction, in
///   enlistment order.
/// - Writes flushed under an envelope must only become durable once the
///   envelope commits (see [`crate::EnvelopeResource`]).
/// - `release` is called after commit and after rollback; it should drop
///   anything still pending for the transaction.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// The kind this store was registered under.
    fn kind(&self) -> StoreKind;

    /// Flushes the pending writes of `scope.transaction_id()`.
    ///
    /// # Errors
    ///
    /// Backend failures propagate unchanged through the commit.
    async fn persist_changes(
        &self,
        scope: &FlushScope,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    /// Releases resources held for a transaction.
    async fn release(&self, transaction_id: TransactionId) -> StoreResult<()> {
        let _ = transaction_id;
        Ok(())
    }
}

impl fmt::Debug for dyn DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore").field("kind", &self.kind()).finish()
    }
}
