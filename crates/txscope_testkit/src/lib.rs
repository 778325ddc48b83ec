//! # txscope testkit
//!
//! Test utilities for txscope.
//!
//! This crate provides:
//! - In-memory store doubles that honor envelope outcomes
//! - A wired coordinator harness with an event feed and flush journal
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txscope_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn commit_flushes() {
//!     let h = TestHarness::new();
//!     let orders = h.memory_store(StoreKind::new("orders"));
//!     let ctx = h.context();
//!     let mut uow = h.factory.create(&ctx).await.unwrap();
//!     orders.write(&uow, "o-1", "pending").unwrap();
//!     uow.commit().await.unwrap();
//!     let _ = uow.dispose().await.unwrap();
//!     assert!(orders.contains("o-1"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod store;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::store::*;
    pub use crate::stress::*;
    pub use txscope_core::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use store::*;
pub use stress::*;
