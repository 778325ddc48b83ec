//! Error types for txscope core.

use crate::store::{StoreError, StoreKind};
use crate::types::{IsolationLevel, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while coordinating a unit of work.
///
/// None of these are retried by the coordinator; they are surfaced to the
/// caller as-is.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation invoked on a unit of work that was already disposed.
    #[error("unit of work {id} has been disposed")]
    ObjectDisposed {
        /// The disposed unit of work.
        id: TransactionId,
    },

    /// Operation not permitted in the unit of work's current state.
    #[error("invalid state for {id}: {message}")]
    InvalidState {
        /// The unit of work.
        id: TransactionId,
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Commit attempted although no store enlisted under the transaction.
    #[error("no data stores enlisted for {id}")]
    NoEnlistedStores {
        /// The unit of work that was never used.
        id: TransactionId,
    },

    /// A store kind was requested that was never registered.
    #[error("unsupported store kind: {kind}")]
    UnsupportedStore {
        /// The requested kind.
        kind: StoreKind,
    },

    /// A Default-mode scope tried to join an envelope with another isolation level.
    #[error("isolation level {requested} does not match ambient level {ambient}")]
    IsolationMismatch {
        /// Level requested by the new scope.
        requested: IsolationLevel,
        /// Level of the enclosing envelope.
        ambient: IsolationLevel,
    },

    /// Commit was cancelled before every store was flushed.
    #[error("commit of {id} cancelled after {flushed} store(s), {remaining} not flushed")]
    Cancelled {
        /// The unit of work.
        id: TransactionId,
        /// Stores already flushed (not compensated).
        flushed: usize,
        /// Stores skipped.
        remaining: usize,
    },

    /// Enlistment into a transaction whose registry entry was already removed.
    #[error("transaction {id} is no longer accepting enlistments")]
    TransactionRetired {
        /// The retired transaction.
        id: TransactionId,
    },

    /// A store asked for the current unit of work outside of any scope.
    #[error("no unit of work is active in this execution context")]
    NoActiveUnitOfWork,

    /// A backend failed while flushing or releasing.
    #[error("store {kind} failed in {id}: {source}")]
    Store {
        /// The unit of work being committed.
        id: TransactionId,
        /// The failing store.
        kind: StoreKind,
        /// The backend error.
        source: StoreError,
    },
}

impl CoreError {
    /// Creates an object disposed error.
    pub fn object_disposed(id: TransactionId) -> Self {
        Self::ObjectDisposed { id }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(id: TransactionId, message: impl Into<String>) -> Self {
        Self::InvalidState {
            id,
            message: message.into(),
        }
    }

    /// Creates a no enlisted stores error.
    pub fn no_enlisted_stores(id: TransactionId) -> Self {
        Self::NoEnlistedStores { id }
    }

    /// Creates an unsupported store error.
    pub fn unsupported_store(kind: StoreKind) -> Self {
        Self::UnsupportedStore { kind }
    }

    /// Wraps a backend failure.
    pub fn store(id: TransactionId, kind: StoreKind, source: StoreError) -> Self {
        Self::Store { id, kind, source }
    }

    /// Returns true for the contract violations a caller can fix by
    /// changing how it drives the unit of work.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CoreError::ObjectDisposed { .. }
                | CoreError::InvalidState { .. }
                | CoreError::NoEnlistedStores { .. }
                | CoreError::UnsupportedStore { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violations() {
        let id = TransactionId::new(7);
        assert!(CoreError::object_disposed(id).is_contract_violation());
        assert!(CoreError::invalid_state(id, "x").is_contract_violation());
        assert!(CoreError::no_enlisted_stores(id).is_contract_violation());
        assert!(CoreError::unsupported_store(StoreKind::new("orders")).is_contract_violation());
        assert!(!CoreError::NoActiveUnitOfWork.is_contract_violation());
    }

    #[test]
    fn error_display() {
        let err = CoreError::no_enlisted_stores(TransactionId::new(3));
        assert_eq!(err.to_string(), "no data stores enlisted for txn:3");

        let err = CoreError::Cancelled {
            id: TransactionId::new(1),
            flushed: 2,
            remaining: 1,
        };
        assert!(err.to_string().contains("after 2 store(s)"));
    }

    #[test]
    fn store_error_is_source() {
        use std::error::Error as _;

        let err = CoreError::store(
            TransactionId::new(9),
            StoreKind::new("ledger"),
            StoreError::backend("unique constraint violated"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("ledger"));
    }
}
