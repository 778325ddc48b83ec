//! Integration tests for nested units of work.

use txscope_testkit::prelude::*;

const ORDERS: StoreKind = StoreKind::new("orders");
const AUDIT: StoreKind = StoreKind::new("audit");
const LEDGER: StoreKind = StoreKind::new("ledger");

#[tokio::test]
async fn default_child_joins_parent_envelope() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "parent", "1").unwrap();

    let mut child = h.factory.create(&ctx).await.unwrap();
    assert!(child.is_joined());
    assert_eq!(child.envelope_id(), parent.envelope_id());
    orders.write(&child, "child", "2").unwrap();

    child.commit().await.unwrap();
    assert!(uow_outcome(&mut child).await.is_committed());
    // Staged until the last participant votes.
    assert!(!orders.contains("child"));

    parent.commit().await.unwrap();
    assert!(uow_outcome(&mut parent).await.is_committed());
    assert!(orders.contains("child"));
    assert!(orders.contains("parent"));
}

#[tokio::test]
async fn default_child_rollback_fails_parent_commit() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "parent", "1").unwrap();

    let mut child = h.factory.create(&ctx).await.unwrap();
    orders.write(&child, "child", "2").unwrap();
    assert!(uow_outcome(&mut child).await.is_rolled_back());

    let err = parent.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { id, .. } if id == parent.id()));
    assert_eq!(parent.state(), UnitOfWorkState::Created);
    assert_eq!(orders.flush_count(), 0);

    assert!(uow_outcome(&mut parent).await.is_rolled_back());
    assert_eq!(orders.durable_len(), 0);
}

#[tokio::test]
async fn envelope_aborted_mid_flush_publishes_only_rollback() {
    let h = TestHarness::new();
    let ctx = h.context();
    let gated = GatedStore::new(LEDGER);

    let mut parent = h.factory.create(&ctx).await.unwrap();
    let mut child = h.factory.create(&ctx).await.unwrap();
    assert!(child.is_joined());
    child.enlist(gated.as_shared()).unwrap();
    let child_id = child.id();

    let committing = tokio::spawn(async move {
        let commit = child.commit().await;
        let outcome = child.dispose().await;
        (commit, outcome)
    });

    gated.wait_for_flush().await;
    assert!(uow_outcome(&mut parent).await.is_rolled_back());
    gated.open();

    let (commit, outcome) = committing.await.unwrap();
    assert!(matches!(commit, Err(CoreError::InvalidState { id, .. }) if id == child_id));
    assert!(matches!(
        outcome,
        Ok(DisposeOutcome::RolledBack {
            cause: RollbackCause::CommitFailed,
            ..
        })
    ));
    assert_eq!(gated.flush_count(), 1);

    let names: Vec<_> = h.events_for(child_id).iter().map(LifecycleEvent::name).collect();
    assert_eq!(names, vec!["rolled_back"]);
    assert_eq!(h.stats().commits, 0);
    assert_eq!(h.stats().rollbacks, 2);
    assert!(!ctx.is_active());
}

#[tokio::test]
async fn committed_child_is_undone_by_parent_rollback() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    let mut child = h.factory.create(&ctx).await.unwrap();
    orders.write(&child, "child", "2").unwrap();
    child.commit().await.unwrap();
    let _ = child.dispose().await.unwrap();
    assert_eq!(orders.staged_count(), 1);

    let _ = parent.dispose().await.unwrap();
    assert!(!orders.contains("child"));
    assert_eq!(orders.staged_count(), 0);
}

#[tokio::test]
async fn new_child_is_independent_of_parent() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "parent", "1").unwrap();

    let mut child = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    assert!(!child.is_joined());
    assert_ne!(child.envelope_id(), parent.envelope_id());
    orders.write(&child, "child", "2").unwrap();
    child.commit().await.unwrap();
    let _ = child.dispose().await.unwrap();
    assert!(orders.contains("child"));

    let outcome = parent.dispose().await.unwrap();
    assert!(outcome.is_rolled_back());
    assert!(orders.contains("child"));
    assert!(!orders.contains("parent"));
}

#[tokio::test]
async fn new_child_rollback_does_not_touch_parent() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "parent", "1").unwrap();

    let mut child = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    orders.write(&child, "child", "2").unwrap();
    let _ = child.dispose().await.unwrap();

    parent.commit().await.unwrap();
    let _ = parent.dispose().await.unwrap();
    assert!(orders.contains("parent"));
    assert!(!orders.contains("child"));
}

#[tokio::test]
async fn suppressed_child_flush_survives_parent_rollback() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let audit = h.memory_store(AUDIT);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "o-1", "new").unwrap();

    let mut child = h
        .factory
        .create_with_mode(&ctx, TransactionMode::Suppress)
        .await
        .unwrap();
    assert_eq!(child.envelope_id(), None);
    audit.write(&child, "attempt-1", "o-1").unwrap();
    child.commit().await.unwrap();
    assert!(audit.contains("attempt-1"));
    let _ = child.dispose().await.unwrap();

    let _ = parent.dispose().await.unwrap();
    assert!(audit.contains("attempt-1"));
    assert!(!orders.contains("o-1"));
}

#[tokio::test]
async fn default_inside_suppress_opens_its_own_envelope() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut outer = h.factory.create(&ctx).await.unwrap();
    let mut suppressed = h
        .factory
        .create_with_mode(&ctx, TransactionMode::Suppress)
        .await
        .unwrap();
    let mut inner = h.factory.create(&ctx).await.unwrap();

    assert!(!inner.is_joined());
    assert!(inner.envelope_id().is_some());
    assert_ne!(inner.envelope_id(), outer.envelope_id());

    orders.write(&inner, "inner", "1").unwrap();
    inner.commit().await.unwrap();
    let _ = inner.dispose().await.unwrap();
    let _ = suppressed.dispose().await.unwrap();
    let _ = outer.dispose().await.unwrap();

    assert!(orders.contains("inner"));
}

#[tokio::test]
async fn three_levels_new_branch_survives_aborted_default_branch() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let audit = h.memory_store(AUDIT);
    let ledger = h.memory_store(LEDGER);
    let ctx = h.context();

    let mut outer = h.factory.create(&ctx).await.unwrap();
    ledger.write(&outer, "outer", "1").unwrap();

    let mut middle = h.factory.create(&ctx).await.unwrap();
    orders.write(&middle, "middle", "2").unwrap();

    let mut inner = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    audit.write(&inner, "inner", "3").unwrap();
    inner.commit().await.unwrap();
    assert!(inner.dispose().await.unwrap().is_committed());

    assert!(middle.dispose().await.unwrap().is_rolled_back());

    // The middle scope shared the outer envelope, so the outer scope must
    // fail loudly instead of committing without the middle's writes.
    let err = outer.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
    assert!(outer.dispose().await.unwrap().is_rolled_back());

    assert!(audit.contains("inner"));
    assert!(!orders.contains("middle"));
    assert!(!ledger.contains("outer"));
}

#[tokio::test]
async fn three_levels_with_independent_outer_branch() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let audit = h.memory_store(AUDIT);
    let ledger = h.memory_store(LEDGER);
    let ctx = h.context();

    let mut outer = h.factory.create(&ctx).await.unwrap();
    ledger.write(&outer, "outer", "1").unwrap();

    let mut middle = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    orders.write(&middle, "middle", "2").unwrap();

    let mut inner = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    audit.write(&inner, "inner", "3").unwrap();
    inner.commit().await.unwrap();
    let _ = inner.dispose().await.unwrap();

    let _ = middle.dispose().await.unwrap();

    outer.commit().await.unwrap();
    assert!(outer.dispose().await.unwrap().is_committed());

    assert!(audit.contains("inner"));
    assert!(!orders.contains("middle"));
    assert!(ledger.contains("outer"));
}

#[tokio::test]
async fn non_transactional_store_is_not_rolled_back() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let cache = MemoryStore::non_transactional(StoreKind::new("cache"));
    h.register(&cache);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    let mut child = h.factory.create(&ctx).await.unwrap();
    orders.write(&child, "o-1", "new").unwrap();
    cache.write(&child, "o-1", "cached").unwrap();
    child.commit().await.unwrap();
    let _ = child.dispose().await.unwrap();
    let _ = parent.dispose().await.unwrap();

    // No cross-backend atomicity without envelope support.
    assert!(!orders.contains("o-1"));
    assert!(cache.contains("o-1"));
}

#[tokio::test]
async fn out_of_order_dispose_keeps_parent_current() {
    let h = TestHarness::new();
    let ctx = h.context();

    let mut outer = h.factory.create(&ctx).await.unwrap();
    let mut middle = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();
    let mut inner = h.factory.create_with_mode(&ctx, TransactionMode::New).await.unwrap();

    let _ = middle.dispose().await.unwrap();
    assert_eq!(ctx.current_transaction_id(), Some(inner.id()));
    assert_eq!(ctx.depth(), 2);

    let _ = inner.dispose().await.unwrap();
    assert_eq!(ctx.current_transaction_id(), Some(outer.id()));
    let _ = outer.dispose().await.unwrap();
    assert!(!ctx.is_active());
}

#[tokio::test]
async fn joining_with_another_isolation_level_fails() {
    let h = TestHarness::new();
    let ctx = h.context();
    let mut outer = h
        .factory
        .create_with(&ctx, TransactionMode::Default, IsolationLevel::Serializable)
        .await
        .unwrap();

    let err = h
        .factory
        .create_with(&ctx, TransactionMode::Default, IsolationLevel::ReadCommitted)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::IsolationMismatch {
            requested: IsolationLevel::ReadCommitted,
            ambient: IsolationLevel::Serializable,
        }
    ));

    let mut same = h
        .factory
        .create_with_options(&ctx, UnitOfWorkOptions::new().isolation(IsolationLevel::Serializable))
        .await
        .unwrap();
    assert!(same.is_joined());
    let _ = same.dispose().await.unwrap();
    let _ = outer.dispose().await.unwrap();
}

#[tokio::test]
async fn separate_contexts_do_not_nest() {
    let h = TestHarness::new();
    let first = h.context();
    let second = h.context();

    let mut a = h.factory.create(&first).await.unwrap();
    let mut b = h.factory.create(&second).await.unwrap();

    assert!(!b.is_joined());
    assert_ne!(a.envelope_id(), b.envelope_id());
    assert_eq!(first.current_transaction_id(), Some(a.id()));
    assert_eq!(second.current_transaction_id(), Some(b.id()));

    let _ = a.dispose().await.unwrap();
    assert_eq!(second.current_transaction_id(), Some(b.id()));
    let _ = b.dispose().await.unwrap();
}

#[tokio::test]
async fn dropped_child_aborts_shared_envelope() {
    let h = TestHarness::new();
    let orders = h.memory_store(ORDERS);
    let ctx = h.context();

    let mut parent = h.factory.create(&ctx).await.unwrap();
    orders.write(&parent, "parent", "1").unwrap();
    {
        let child = h.factory.create(&ctx).await.unwrap();
        orders.write(&child, "child", "2").unwrap();
    }

    assert_eq!(ctx.current_transaction_id(), Some(parent.id()));
    assert_eq!(h.stats().units_abandoned, 1);
    assert!(matches!(
        parent.commit().await,
        Err(CoreError::InvalidState { .. })
    ));
    let _ = parent.dispose().await.unwrap();
}

async fn uow_outcome(uow: &mut UnitOfWork) -> DisposeOutcome {
    uow.dispose().await.unwrap()
}
