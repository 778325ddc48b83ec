//! Per-unit-of-work view of an envelope.

use crate::ambient::{Envelope, EnvelopeStatus};
use crate::error::{CoreError, CoreResult};
use crate::types::{EnvelopeId, IsolationLevel, TransactionId, TransactionMode};
use std::sync::Arc;

/// The ambient wrapper owned by one unit of work.
///
/// Holds at most one envelope and at most one vote. Dropping a scope that
/// has not voted aborts its envelope, so release happens on every exit path.
#[derive(Debug)]
pub struct AmbientScope {
    mode: TransactionMode,
    isolation_level: IsolationLevel,
    envelope: Option<Arc<Envelope>>,
    joined: bool,
    voted: bool,
}

impl AmbientScope {
    /// Opens the envelope `mode` calls for.
    ///
    /// `enclosing` is the envelope of the nearest enclosing scope in the
    /// same execution context; `None` when there is none or it is
    /// suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IsolationMismatch`] when a Default-mode scope
    /// would join an envelope opened with another isolation level.
    pub fn open(
        mode: TransactionMode,
        isolation_level: IsolationLevel,
        enclosing: Option<&Arc<Envelope>>,
    ) -> CoreResult<Self> {
        let (envelope, joined) = match mode {
            TransactionMode::Suppress => (None, false),
            TransactionMode::New => (Some(Envelope::open(isolation_level)), false),
            TransactionMode::Default => match enclosing {
                Some(env) if env.status() != EnvelopeStatus::Committed => {
                    if env.isolation_level() != isolation_level {
                        return Err(CoreError::IsolationMismatch {
                            requested: isolation_level,
                            ambient: env.isolation_level(),
                        });
                    }
                    if !env.join() {
                        tracing::debug!(
                            envelope = %env.id(),
                            "joining an envelope that is already aborted"
                        );
                    }
                    (Some(Arc::clone(env)), true)
                }
                Some(env) => {
                    tracing::debug!(
                        envelope = %env.id(),
                        "enclosing envelope already committed, opening a new one"
                    );
                    (Some(Envelope::open(isolation_level)), false)
                }
                None => (Some(Envelope::open(isolation_level)), false),
            },
        };

        Ok(Self {
            mode,
            isolation_level,
            envelope,
            joined,
            voted: false,
        })
    }

    /// The mode this scope was opened with.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// The requested isolation level.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// The envelope, unless the scope is suppressed.
    #[must_use]
    pub fn envelope(&self) -> Option<&Arc<Envelope>> {
        self.envelope.as_ref()
    }

    /// ID of the envelope, if any.
    #[must_use]
    pub fn envelope_id(&self) -> Option<EnvelopeId> {
        self.envelope.as_ref().map(|e| e.id())
    }

    /// Whether this scope joined an enclosing envelope instead of opening one.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Whether this scope runs without an envelope.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.envelope.is_none()
    }

    /// Whether this scope already voted.
    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.voted
    }

    /// Whether the envelope was aborted, by this or any other participant.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.envelope.as_ref().is_some_and(|e| e.is_aborted())
    }

    /// Votes commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the scope already voted or the
    /// envelope was aborted by another participant.
    pub fn complete(&mut self, id: TransactionId) -> CoreResult<()> {
        if self.voted {
            return Err(CoreError::invalid_state(id, "ambient scope already voted"));
        }
        self.voted = true;

        let Some(envelope) = &self.envelope else {
            return Ok(());
        };
        match envelope.vote_commit() {
            EnvelopeStatus::Aborted => Err(CoreError::invalid_state(
                id,
                format!("ambient envelope {} was aborted", envelope.id()),
            )),
            status => {
                tracing::debug!(
                    transaction_id = %id,
                    envelope = %envelope.id(),
                    %status,
                    "ambient scope completed"
                );
                Ok(())
            }
        }
    }

    /// Votes abort. No-op if the scope already voted.
    pub fn abort(&mut self) {
        if self.voted {
            return;
        }
        self.voted = true;
        if let Some(envelope) = &self.envelope {
            envelope.vote_abort();
        }
    }
}

impl Drop for AmbientScope {
    fn drop(&mut self) {
        if !self.voted {
            if let Some(envelope) = &self.envelope {
                tracing::debug!(envelope = %envelope.id(), "ambient scope released without a vote");
            }
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RC: IsolationLevel = IsolationLevel::ReadCommitted;

    fn id() -> TransactionId {
        TransactionId::new(1)
    }

    #[test]
    fn default_without_enclosing_opens_envelope() {
        let scope = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        assert!(!scope.is_joined());
        assert!(!scope.is_suppressed());
    }

    #[test]
    fn default_joins_enclosing() {
        let parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        let child = AmbientScope::open(TransactionMode::Default, RC, parent.envelope()).unwrap();

        assert!(child.is_joined());
        assert_eq!(child.envelope_id(), parent.envelope_id());
        assert_eq!(parent.envelope().unwrap().participants(), 2);
    }

    #[test]
    fn new_never_joins() {
        let parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        let child = AmbientScope::open(TransactionMode::New, RC, parent.envelope()).unwrap();

        assert!(!child.is_joined());
        assert_ne!(child.envelope_id(), parent.envelope_id());
    }

    #[test]
    fn suppress_has_no_envelope() {
        let parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        let mut child = AmbientScope::open(TransactionMode::Suppress, RC, parent.envelope()).unwrap();

        assert!(child.is_suppressed());
        assert!(child.complete(id()).is_ok());
        assert_eq!(parent.envelope().unwrap().participants(), 1);
    }

    #[test]
    fn isolation_mismatch_on_join() {
        let parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        let result = AmbientScope::open(
            TransactionMode::Default,
            IsolationLevel::Serializable,
            parent.envelope(),
        );
        assert!(matches!(result, Err(CoreError::IsolationMismatch { .. })));
    }

    #[test]
    fn child_abort_fails_parent_completion() {
        let mut parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        let mut child = AmbientScope::open(TransactionMode::Default, RC, parent.envelope()).unwrap();

        child.abort();
        assert!(parent.is_aborted());
        assert!(matches!(
            parent.complete(id()),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn drop_without_vote_aborts() {
        let parent = AmbientScope::open(TransactionMode::Default, RC, None).unwrap();
        {
            let _child = AmbientScope::open(TransactionMode::Default, RC, parent.envelope()).unwrap();
        }
        assert!(parent.is_aborted());
    }

    #[test]
    fn double_complete_is_invalid() {
        let mut scope = AmbientScope::open(TransactionMode::New, RC, None).unwrap();
        scope.complete(id()).unwrap();
        assert!(scope.complete(id()).is_err());
        assert_eq!(scope.envelope().unwrap().status(), EnvelopeStatus::Committed);
    }
}
