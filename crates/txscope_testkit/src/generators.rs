//! Property-based test generators using proptest.
//!
//! Store kinds are static tags, so strategies pick from a fixed pool rather
//! than generating arbitrary strings.

use proptest::prelude::*;
use txscope_core::{IsolationLevel, StoreKind, TransactionMode};

/// Pool of store kinds the strategies draw from.
pub const STORE_KINDS: [StoreKind; 8] = [
    StoreKind::new("orders"),
    StoreKind::new("customers"),
    StoreKind::new("inventory"),
    StoreKind::new("audit"),
    StoreKind::new("ledger"),
    StoreKind::new("search"),
    StoreKind::new("cache"),
    StoreKind::new("outbox"),
];

/// Strategy for generating distinct store kinds in random order.
pub fn store_kinds_strategy(max: usize) -> impl Strategy<Value = Vec<StoreKind>> {
    let max = max.clamp(1, STORE_KINDS.len());
    prop::sample::subsequence(STORE_KINDS.to_vec(), 1..=max).prop_shuffle()
}

/// Strategy for generating an enlistment sequence that may repeat kinds.
pub fn enlistment_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<StoreKind>> {
    prop::collection::vec(prop::sample::select(STORE_KINDS.to_vec()), 1..=max_len.max(1))
}

/// Strategy for generating transaction modes.
pub fn mode_strategy() -> impl Strategy<Value = TransactionMode> {
    prop_oneof![
        Just(TransactionMode::Default),
        Just(TransactionMode::New),
        Just(TransactionMode::Suppress),
    ]
}

/// Strategy for generating isolation levels.
pub fn isolation_strategy() -> impl Strategy<Value = IsolationLevel> {
    prop_oneof![
        Just(IsolationLevel::ReadUncommitted),
        Just(IsolationLevel::ReadCommitted),
        Just(IsolationLevel::RepeatableRead),
        Just(IsolationLevel::Serializable),
        Just(IsolationLevel::Snapshot),
    ]
}

/// One level of a nested scope plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeStep {
    /// Mode the level is created with.
    pub mode: TransactionMode,
    /// Whether the level commits before it is disposed.
    pub commit: bool,
}

/// Strategy for generating a nesting plan, outermost level first.
pub fn nesting_plan_strategy(max_depth: usize) -> impl Strategy<Value = Vec<ScopeStep>> {
    prop::collection::vec(
        (mode_strategy(), any::<bool>()).prop_map(|(mode, commit)| ScopeStep { mode, commit }),
        1..=max_depth.max(1),
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
