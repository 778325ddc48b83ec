//! Unit of work state machine.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a unit of work.
///
/// ```text
/// Created ──commit──▶ CommitAttempted ──ok──▶ Completed ──┐
///    │                      │                             ├──▶ Disposed
///    └──────rollback────────┴──────▶ RolledBack ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOfWorkState {
    /// Created and current; commit not yet attempted.
    Created,
    /// A commit is running or has failed.
    CommitAttempted,
    /// Every store flushed and the ambient vote was cast.
    Completed,
    /// Abandoned; nothing further is flushed.
    RolledBack,
    /// Released. Terminal.
    Disposed,
}

impl UnitOfWorkState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: UnitOfWorkState) -> bool {
        use UnitOfWorkState::*;
        matches!(
            (self, next),
            (Created, CommitAttempted)
                | (Created, RolledBack)
                | (CommitAttempted, Completed)
                | (CommitAttempted, RolledBack)
                | (Completed, Disposed)
                | (RolledBack, Disposed)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == UnitOfWorkState::Disposed
    }

    /// Moves to `next`, rejecting illegal transitions.
    pub(crate) fn transition(&mut self, id: TransactionId, next: UnitOfWorkState) -> CoreResult<()> {
        if *self == UnitOfWorkState::Disposed {
            return Err(CoreError::object_disposed(id));
        }
        if !self.can_transition_to(next) {
            return Err(CoreError::invalid_state(
                id,
                format!("cannot move from {self} to {next}"),
            ));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::CommitAttempted => "commit-attempted",
            Self::Completed => "completed",
            Self::RolledBack => "rolled-back",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
