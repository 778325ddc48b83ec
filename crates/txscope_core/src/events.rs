//! Lifecycle notifications.
//!
//! The manager publishes one event per transition of a unit of work to an
//! [`EventBus`]. [`EventFeed`] is an in-process bus that fans events out to
//! subscribers and keeps a bounded history.
//!
//! # Usage
//!
//! ```rust,ignore
//! let feed = Arc::new(EventFeed::new());
//! let receiver = feed.subscribe();
//! let manager = UnitOfWorkManager::builder().event_bus(feed.clone()).build();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{event:?}");
//!     }
//! });
//! ```

use crate::types::TransactionId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

/// Why a unit of work rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackCause {
    /// Disposed without a commit being attempted.
    NotCommitted,
    /// A commit was attempted and failed, explicitly or through auto-complete.
    CommitFailed,
}

/// A lifecycle notification for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    /// The unit of work was created and became current.
    Created {
        /// The unit of work.
        transaction_id: TransactionId,
    },
    /// Every enlisted store flushed.
    Committed {
        /// The unit of work.
        transaction_id: TransactionId,
    },
    /// The unit of work was abandoned.
    RolledBack {
        /// The unit of work.
        transaction_id: TransactionId,
        /// What led to the rollback.
        cause: RollbackCause,
    },
    /// The unit of work finished its commit path.
    Completed {
        /// The unit of work.
        transaction_id: TransactionId,
    },
}

impl LifecycleEvent {
    /// The unit of work the event is about.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            Self::Created { transaction_id }
            | Self::Committed { transaction_id }
            | Self::RolledBack { transaction_id, .. }
            | Self::Completed { transaction_id } => *transaction_id,
        }
    }

    /// Short name of the event kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Committed { .. } => "committed",
            Self::RolledBack { .. } => "rolled_back",
            Self::Completed { .. } => "completed",
        }
    }
}

/// Receiver of lifecycle notifications.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: LifecycleEvent);
}

/// A bus that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _event: LifecycleEvent) {}
}

/// An in-process bus with subscribers and a bounded history.
///
/// The feed:
/// - Preserves publish order
/// - Supports multiple subscribers
/// - Is thread-safe
pub struct EventFeed {
    /// Subscribers (senders).
    subscribers: RwLock<Vec<Sender<LifecycleEvent>>>,
    /// Recent events, oldest first.
    history: RwLock<Vec<LifecycleEvent>>,
    /// Maximum history size.
    max_history: usize,
}

impl EventFeed {
    /// Creates a new feed.
    pub fn new() -> Self {
        Self::with_max_history(10000)
    }

    /// Creates a feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Receiver<LifecycleEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Records an event and sends it to every live subscriber.
    pub fn emit(&self, event: LifecycleEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                let to_remove = history.len() - self.max_history;
                history.drain(0..to_remove);
            }
        }

        // Disconnected receivers are dropped here.
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns a copy of the history, oldest first.
    pub fn history(&self) -> Vec<LifecycleEvent> {
        self.history.read().clone()
    }

    /// Returns the recorded events for one unit of work.
    pub fn events_for(&self, id: TransactionId) -> Vec<LifecycleEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.transaction_id() == id)
            .cloned()
            .collect()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Clears the history.
    pub fn clear(&self) {
        self.history.write().clear();
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("history_len", &self.history_len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[async_trait]
impl EventBus for EventFeed {
    async fn publish(&self, event: LifecycleEvent) {
        self.emit(event);
    }
}
