//! Execution-context-local "current unit of work".
//!
//! An [`ExecutionContext`] stands for one logical flow: one inbound request,
//! one job, one async call chain. Each unit of work created through it pushes
//! a frame; the top frame is the current unit of work. Clones share the same
//! stack, so tasks fanned out from one flow see the same current unit of
//! work. Separate contexts never observe each other.

use crate::ambient::Envelope;
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// One active unit of work in a flow.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) transaction_id: TransactionId,
    /// `None` for a suppressed scope.
    pub(crate) envelope: Option<Arc<Envelope>>,
}

#[derive(Debug)]
struct ContextInner {
    flow_id: Uuid,
    frames: Mutex<Vec<Frame>>,
}

/// Handle to the frame stack of one logical flow.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Starts a new, empty flow.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                flow_id: Uuid::new_v4(),
                frames: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identifier of the flow, for log correlation.
    #[must_use]
    pub fn flow_id(&self) -> Uuid {
        self.inner.flow_id
    }

    /// ID of the innermost active unit of work.
    #[must_use]
    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.inner.frames.lock().last().map(|f| f.transaction_id)
    }

    /// Whether any unit of work is active in this flow.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.frames.lock().is_empty()
    }

    /// Number of nested units of work.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.frames.lock().len()
    }

    /// Whether `self` and `other` are handles to the same flow.
    #[must_use]
    pub fn same_flow(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Envelope a Default-mode scope opened now would join.
    ///
    /// Only the innermost frame counts: a suppressed frame hides everything
    /// beneath it.
    pub(crate) fn enclosing_envelope(&self) -> Option<Arc<Envelope>> {
        self.inner
            .frames
            .lock()
            .last()
            .and_then(|f| f.envelope.clone())
    }

    pub(crate) fn push(&self, frame: Frame) {
        self.inner.frames.lock().push(frame);
    }

    /// Removes the frame of `id`, wherever it sits.
    ///
    /// Returns false if the frame is not on the stack.
    pub(crate) fn remove(&self, id: TransactionId) -> bool {
        let mut frames = self.inner.frames.lock();
        let Some(position) = frames.iter().rposition(|f| f.transaction_id == id) else {
            return false;
        };
        if position + 1 != frames.len() {
            tracing::warn!(
                flow_id = %self.inner.flow_id,
                transaction_id = %id,
                depth = frames.len(),
                "unit of work released out of order"
            );
        }
        frames.remove(position);
        true
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
