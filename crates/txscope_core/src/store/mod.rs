//! Store contract and typed store resolution.
//!
//! Every persistence backend participates through the [`DataStore`] trait.
//! Backends are resolved by an explicit [`StoreKind`] tag registered in a
//! [`StoreCatalog`]; there is no name-based discovery.

mod catalog;
mod contract;

pub use catalog::{StoreCatalog, StoreFactory};
pub use contract::{DataStore, FlushScope, StoreError, StoreKind, StoreResult};
