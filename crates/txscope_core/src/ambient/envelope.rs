//! Envelope state and participant voting.

use crate::store::{StoreError, StoreResult};
use crate::types::{EnvelopeId, IsolationLevel};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Outcome state of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnvelopeStatus {
    /// Participants are still voting.
    Active,
    /// Every participant voted commit.
    Committed,
    /// At least one participant voted abort.
    Aborted,
}

impl EnvelopeStatus {
    /// Returns true once the envelope can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EnvelopeStatus::Active)
    }
}

impl fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A backend resource that must learn the envelope's outcome.
///
/// Stores that stage writes under an envelope enlist here; exactly one of
/// `commit` or `abort` is called per enlistment.
pub trait EnvelopeResource: Send + Sync {
    /// The envelope committed; staged writes become durable.
    fn commit(&self, envelope: EnvelopeId);

    /// The envelope aborted; staged writes are discarded.
    fn abort(&self, envelope: EnvelopeId);
}

struct EnvelopeInner {
    status: EnvelopeStatus,
    /// Participants that joined over the envelope's lifetime.
    participants: usize,
    /// Participants that have not voted yet.
    pending_votes: usize,
    resources: Vec<Arc<dyn EnvelopeResource>>,
}

/// A shared transactional context.
pub struct Envelope {
    id: EnvelopeId,
    isolation_level: IsolationLevel,
    inner: Mutex<EnvelopeInner>,
}

impl Envelope {
    /// Opens an envelope with its creator as the only participant.
    pub(crate) fn open(isolation_level: IsolationLevel) -> Arc<Self> {
        Arc::new(Self {
            id: EnvelopeId::generate(),
            isolation_level,
            inner: Mutex::new(EnvelopeInner {
                status: EnvelopeStatus::Active,
                participants: 1,
                pending_votes: 1,
                resources: Vec::new(),
            }),
        })
    }

    /// Returns the envelope ID.
    #[must_use]
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    /// Returns the isolation level the envelope was opened with.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> EnvelopeStatus {
        self.inner.lock().status
    }

    /// Checks if the envelope is still accepting votes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == EnvelopeStatus::Active
    }

    /// Checks if the envelope was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.status() == EnvelopeStatus::Aborted
    }

    /// Number of participants that joined, creator included.
    #[must_use]
    pub fn participants(&self) -> usize {
        self.inner.lock().participants
    }

    /// Number of participants that have not voted.
    #[must_use]
    pub fn pending_votes(&self) -> usize {
        self.inner.lock().pending_votes
    }

    /// Number of enlisted resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.inner.lock().resources.len()
    }

    /// Adds a participant. Returns false if the envelope is already terminal.
    pub(crate) fn join(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.status.is_terminal() {
            return false;
        }
        inner.participants += 1;
        inner.pending_votes += 1;
        true
    }

    /// Enlists a resource for outcome notification.
    ///
    /// Returns `Ok(false)` if the same resource is already enlisted.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::EnvelopeClosed`] once the envelope is terminal.
    pub fn enlist_resource(&self, resource: Arc<dyn EnvelopeResource>) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.status.is_terminal() {
            return Err(StoreError::EnvelopeClosed {
                envelope: self.id,
                status: inner.status,
            });
        }

        let target = Arc::as_ptr(&resource) as *const ();
        if inner
            .resources
            .iter()
            .any(|r| Arc::as_ptr(r) as *const () == target)
        {
            return Ok(false);
        }
        inner.resources.push(resource);
        Ok(true)
    }

    /// Records a commit vote; commits once no vote is pending.
    pub(crate) fn vote_commit(&self) -> EnvelopeStatus {
        let resources = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                return inner.status;
            }
            inner.pending_votes = inner.pending_votes.saturating_sub(1);
            if inner.pending_votes > 0 {
                return EnvelopeStatus::Active;
            }
            inner.status = EnvelopeStatus::Committed;
            std::mem::take(&mut inner.resources)
        };

        tracing::debug!(envelope = %self.id, resources = resources.len(), "envelope committed");
        for resource in resources {
            resource.commit(self.id);
        }
        EnvelopeStatus::Committed
    }

    /// Records an abort vote; the envelope aborts immediately.
    pub(crate) fn vote_abort(&self) -> EnvelopeStatus {
        let resources = {
            let mut inner = self.inner.lock();
            if inner.status.is_terminal() {
                return inner.status;
            }
            inner.pending_votes = inner.pending_votes.saturating_sub(1);
            inner.status = EnvelopeStatus::Aborted;
            std::mem::take(&mut inner.resources)
        };

        tracing::debug!(envelope = %self.id, resources = resources.len(), "envelope aborted");
        for resource in resources {
            resource.abort(self.id);
        }
        EnvelopeStatus::Aborted
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("isolation_level", &self.isolation_level)
            .field("status", &inner.status)
            .field("participants", &inner.participants)
            .field("pending_votes", &inner.pending_votes)
            .finish_non_exhaustive()
    }
}
