//! Unit of work construction.

use crate::ambient::AmbientScope;
use crate::config::UnitOfWorkOptions;
use crate::context::ExecutionContext;
use crate::error::{CoreError, CoreResult};
use crate::events::LifecycleEvent;
use crate::manager::UnitOfWorkManager;
use crate::types::{IsolationLevel, TransactionId, TransactionMode};
use crate::unit_of_work::{DisposeOutcome, UnitOfWork, UnitOfWorkState};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Creates units of work and makes them current.
///
/// Omitted mode, isolation level and auto-complete flag fall back to the
/// manager's [`Config`](crate::Config). Creation performs no store I/O.
#[derive(Debug, Clone)]
pub struct UnitOfWorkFactory {
    manager: Arc<UnitOfWorkManager>,
}

impl UnitOfWorkFactory {
    /// Creates a factory over `manager`.
    pub fn new(manager: Arc<UnitOfWorkManager>) -> Self {
        Self { manager }
    }

    /// Returns the manager.
    pub fn manager(&self) -> &Arc<UnitOfWorkManager> {
        &self.manager
    }

    /// Creates a unit of work with the configured defaults.
    ///
    /// # Errors
    ///
    /// See [`create_with_options`](Self::create_with_options).
    pub async fn create(&self, ctx: &ExecutionContext) -> CoreResult<UnitOfWork> {
        self.create_with_options(ctx, UnitOfWorkOptions::new()).await
    }

    /// Creates a unit of work with `mode`.
    ///
    /// # Errors
    ///
    /// See [`create_with_options`](Self::create_with_options).
    pub async fn create_with_mode(
        &self,
        ctx: &ExecutionContext,
        mode: TransactionMode,
    ) -> CoreResult<UnitOfWork> {
        self.create_with_options(ctx, UnitOfWorkOptions::new().mode(mode))
            .await
    }

    /// Creates a unit of work with `mode` and `isolation`.
    ///
    /// # Errors
    ///
    /// See [`create_with_options`](Self::create_with_options).
    pub async fn create_with(
        &self,
        ctx: &ExecutionContext,
        mode: TransactionMode,
        isolation: IsolationLevel,
    ) -> CoreResult<UnitOfWork> {
        let options = UnitOfWorkOptions::new().mode(mode).isolation(isolation);
        self.create_with_options(ctx, options).await
    }

    /// Creates a unit of work and enlists it as current in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IsolationMismatch`] when a Default-mode unit of
    /// work would join an envelope of another isolation level.
    pub async fn create_with_options(
        &self,
        ctx: &ExecutionContext,
        options: UnitOfWorkOptions,
    ) -> CoreResult<UnitOfWork> {
        let config = self.manager.config();
        let mode = options.mode.unwrap_or(config.default_mode);
        let isolation = options.isolation.unwrap_or(config.default_isolation);
        let auto_complete = options.auto_complete.unwrap_or(config.auto_complete);

        let enclosing = ctx.enclosing_envelope();
        let ambient = AmbientScope::open(mode, isolation, enclosing.as_ref())?;
        let id = TransactionId::generate();
        let uow = UnitOfWork::new(id, ambient, auto_complete, Arc::clone(&self.manager), ctx.clone());

        self.manager.enlist_unit_of_work(ctx, &uow);
        self.manager.stats().record_unit_created();
        if config.emit_created_events {
            self.manager
                .publish(LifecycleEvent::Created { transaction_id: id })
                .await;
        }
        Ok(uow)
    }

    /// Runs `f` inside a new unit of work.
    ///
    /// Commits if `f` returns `Ok` and did not commit itself, rolls back if
    /// it returns `Err`, and disposes in both cases.
    ///
    /// ```rust,ignore
    /// let total = factory
    ///     .transaction(&ctx, TransactionMode::Default, move |uow| {
    ///         Box::pin(async move {
    ///             let store = uow.store(ORDERS)?;
    ///             // ...
    ///             Ok(42)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// The error returned by `f`, or the commit error.
    pub async fn transaction<T, F>(
        &self,
        ctx: &ExecutionContext,
        mode: TransactionMode,
        f: F,
    ) -> CoreResult<T>
    where
        T: Send + 'static,
        F: for<'u> FnOnce(&'u mut UnitOfWork) -> BoxFuture<'u, CoreResult<T>> + Send,
    {
        let mut uow = self.create_with_mode(ctx, mode).await?;
        let id = uow.id();

        match f(&mut uow).await {
            Ok(value) => {
                if uow.state() == UnitOfWorkState::Created {
                    if let Err(error) = uow.commit().await {
                        if let Err(dispose_error) = uow.dispose().await {
                            tracing::warn!(transaction_id = %id, error = %dispose_error, "dispose failed");
                        }
                        return Err(error);
                    }
                }
                match uow.dispose().await? {
                    DisposeOutcome::Committed => Ok(value),
                    DisposeOutcome::RolledBack { error: Some(error), .. } => Err(error),
                    DisposeOutcome::RolledBack { .. } | DisposeOutcome::AlreadyDisposed => Err(
                        CoreError::invalid_state(id, "unit of work did not commit"),
                    ),
                }
            }
            Err(error) => {
                uow.set_auto_complete(false);
                match uow.dispose().await {
                    Ok(outcome) => {
                        tracing::debug!(transaction_id = %id, ?outcome, "transaction body failed");
                    }
                    Err(dispose_error) => {
                        tracing::warn!(transaction_id = %id, error = %dispose_error, "dispose failed");
                    }
                }
                Err(error)
            }
        }
    }
}
