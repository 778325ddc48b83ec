//! Coordinator configuration.

use crate::types::{IsolationLevel, TransactionMode};

/// Process-wide defaults, supplied once when the manager is built.
#[derive(Debug, Clone)]
pub struct Config {
    /// Isolation level used when a caller does not ask for one.
    pub default_isolation: IsolationLevel,

    /// Mode used when a caller does not ask for one.
    pub default_mode: TransactionMode,

    /// Whether disposing an uncommitted unit of work attempts a commit.
    pub auto_complete: bool,

    /// Whether a `Created` event is published for every new unit of work.
    pub emit_created_events: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::ReadCommitted,
            default_mode: TransactionMode::Default,
            auto_complete: false,
            emit_created_events: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default isolation level.
    #[must_use]
    pub const fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }

    /// Sets the default transaction mode.
    #[must_use]
    pub const fn default_mode(mut self, mode: TransactionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sets whether dispose attempts a commit.
    #[must_use]
    pub const fn auto_complete(mut self, value: bool) -> Self {
        self.auto_complete = value;
        self
    }

    /// Sets whether `Created` events are published.
    #[must_use]
    pub const fn emit_created_events(mut self, value: bool) -> Self {
        self.emit_created_events = value;
        self
    }
}

/// Per-call overrides for a new unit of work.
///
/// Unset fields fall back to [`Config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitOfWorkOptions {
    /// Requested mode.
    pub mode: Option<TransactionMode>,
    /// Requested isolation level.
    pub isolation: Option<IsolationLevel>,
    /// Requested auto-complete behavior.
    pub auto_complete: Option<bool>,
}

impl UnitOfWorkOptions {
    /// Creates options that defer everything to the configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a mode.
    #[must_use]
    pub const fn mode(mut self, mode: TransactionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Requests an isolation level.
    #[must_use]
    pub const fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Requests auto-complete on dispose.
    #[must_use]
    pub const fn auto_complete(mut self, value: bool) -> Self {
        self.auto_complete = Some(value);
        self
    }
}
