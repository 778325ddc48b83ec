//! # txscope core
//!
//! Unit-of-work coordination across heterogeneous persistence backends.
//!
//! This crate provides:
//! - Units of work with a validated lifecycle (commit, rollback, dispose)
//! - Nested scoping through ambient envelopes (Default, New, Suppress)
//! - A concurrent enlistment registry of participating stores
//! - Ordered flush orchestration with cancellation
//! - Lifecycle events published to a pluggable bus
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use txscope_core::{ExecutionContext, StoreKind, UnitOfWorkFactory, UnitOfWorkManager};
//!
//! const ORDERS: StoreKind = StoreKind::new("orders");
//!
//! let manager = UnitOfWorkManager::builder().build();
//! manager.catalog().register(ORDERS, || orders_store());
//! let factory = UnitOfWorkFactory::new(manager);
//!
//! let ctx = ExecutionContext::new();
//! let mut uow = factory.create(&ctx).await?;
//! let orders = uow.store(ORDERS)?;
//! // ... stage writes on `orders` ...
//! uow.commit().await?;
//! let _ = uow.dispose().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ambient;
mod config;
mod context;
mod error;
mod events;
mod factory;
mod manager;
mod registry;
mod stats;
mod store;
mod types;
mod unit_of_work;

#[cfg(test)]
mod testing;

pub use ambient::{AmbientScope, Envelope, EnvelopeResource, EnvelopeStatus};
pub use config::{Config, UnitOfWorkOptions};
pub use context::ExecutionContext;
pub use error::{CoreError, CoreResult};
pub use events::{EventBus, EventFeed, LifecycleEvent, NullEventBus, RollbackCause};
pub use factory::UnitOfWorkFactory;
pub use manager::{UnitOfWorkManager, UnitOfWorkManagerBuilder};
pub use registry::{EnlistedStore, EnlistmentRegistry};
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use store::{DataStore, FlushScope, StoreCatalog, StoreError, StoreFactory, StoreKind, StoreResult};
pub use types::{EnvelopeId, IsolationLevel, TransactionId, TransactionMode};
pub use unit_of_work::{DisposeOutcome, UnitOfWork, UnitOfWorkState};

// Re-exported so adapters don't need their own dependency for the signature.
pub use tokio_util::sync::CancellationToken;
