//! Stress tests for the coordinator.
//!
//! These exercise many concurrent flows and fan-out enlistment on a
//! multi-threaded runtime.

use crate::fixtures::TestHarness;
use crate::generators::STORE_KINDS;
use crate::store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use txscope_core::{CoreError, CoreResult, DisposeOutcome, ExecutionContext, StoreKind};

/// How the units of work of a stress run ended.
#[derive(Debug, Clone, Default)]
pub struct StressTestResult {
    /// Units of work that disposed committed.
    pub committed: usize,
    /// Units of work that disposed rolled back.
    pub rolled_back: usize,
    /// Units of work where create, write, commit or dispose returned an error.
    pub errors: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
}

impl StressTestResult {
    /// Every unit of work the run finished, whatever the outcome.
    pub fn units(&self) -> usize {
        self.committed + self.rolled_back + self.errors
    }

    /// Finished units of work per second.
    pub fn units_per_second(&self) -> f64 {
        match self.elapsed.as_secs_f64() {
            secs if secs > 0.0 => self.units() as f64 / secs,
            _ => 0.0,
        }
    }

    /// Prints one line describing the run.
    pub fn print_summary(&self, name: &str) {
        println!(
            "{name}: {} units in {:?} ({:.0}/s), committed={} rolled_back={} errors={}",
            self.units(),
            self.elapsed,
            self.units_per_second(),
            self.committed,
            self.rolled_back,
            self.errors,
        );
    }
}

/// Outcome counters shared by the tasks of a run.
#[derive(Debug, Default)]
struct Tally {
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    errors: AtomicUsize,
}

impl Tally {
    fn record(&self, outcome: &CoreResult<DisposeOutcome>) {
        let counter = match outcome {
            Ok(DisposeOutcome::Committed) => &self.committed,
            Ok(_) => &self.rolled_back,
            Err(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, elapsed: Duration) -> StressTestResult {
        StressTestResult {
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of units of work to run.
    pub operations: usize,
    /// Number of concurrent tasks.
    pub tasks: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            tasks: 8,
        }
    }
}

/// One unit of work: write `key`, optionally commit, dispose.
async fn run_unit(
    harness: &TestHarness,
    store: &MemoryStore,
    key: String,
    commit: bool,
) -> CoreResult<DisposeOutcome> {
    let ctx = ExecutionContext::new();
    let mut uow = harness.factory.create(&ctx).await?;
    store.write(&uow, key, "v")?;
    if commit {
        uow.commit().await?;
    }
    uow.dispose().await
}

/// Runs independent flows on `config.tasks` tasks, each committing its
/// units of work. Every key should end up durable.
pub async fn stress_concurrent_flows(
    harness: Arc<TestHarness>,
    store: MemoryStore,
    config: &StressConfig,
) -> StressTestResult {
    let tally = Arc::new(Tally::default());
    let ops_per_task = config.operations / config.tasks.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.tasks)
        .map(|t| {
            let harness = Arc::clone(&harness);
            let store = store.clone();
            let tally = Arc::clone(&tally);

            tokio::spawn(async move {
                for i in 0..ops_per_task {
                    let key = format!("t{t}-{i}");
                    tally.record(&run_unit(&harness, &store, key, true).await);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("Task panicked");
    }

    tally.finish(start.elapsed())
}

/// Alternates committed and abandoned units of work on one flow at a time.
pub async fn stress_rollbacks(
    harness: Arc<TestHarness>,
    store: MemoryStore,
    config: &StressConfig,
) -> StressTestResult {
    let tally = Tally::default();
    let start = Instant::now();

    for i in 0..config.operations {
        let commit = i % 2 == 1;
        tally.record(&run_unit(&harness, &store, format!("r{i}"), commit).await);
    }

    tally.finish(start.elapsed())
}

/// Resolves stores from `config.tasks` tasks sharing one execution context,
/// then commits once.
///
/// Returns the kinds each task asked for; every distinct kind should be
/// flushed exactly once.
pub async fn stress_fan_out_enlistment(
    harness: Arc<TestHarness>,
    config: &StressConfig,
) -> CoreResult<Vec<StoreKind>> {
    for kind in STORE_KINDS {
        if !harness.manager.catalog().contains(kind) {
            harness.memory_store(kind);
        }
    }

    let ctx = ExecutionContext::new();
    let mut uow = harness.factory.create(&ctx).await?;

    let handles: Vec<_> = (0..config.tasks)
        .map(|t| {
            let harness = Arc::clone(&harness);
            let ctx = ctx.clone();
            let kind = STORE_KINDS[t % STORE_KINDS.len()];
            tokio::spawn(async move {
                harness.manager.store(&ctx, kind)?;
                Ok::<_, CoreError>(kind)
            })
        })
        .collect();

    let mut requested = Vec::with_capacity(handles.len());
    for handle in handles {
        requested.push(handle.await.expect("Task panicked")?);
    }

    uow.commit().await?;
    let _ = uow.dispose().await?;
    Ok(requested)
}
