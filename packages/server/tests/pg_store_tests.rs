//! Postgres store and notification bridge.
//!
//! These need Docker for the Postgres container:
//! `cargo test --test pg_store_tests -- --ignored`

mod common;

use std::time::Duration;

use crate::common::{submission, PgHarness};
use coin_toss_core::common::SessionId;
use coin_toss_core::domains::aggregation::AggregationPipeline;
use coin_toss_core::domains::results::TossResult;
use coin_toss_core::kernel::{BaseExperimentStore, FeedEvent};
use test_context::test_context;

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn session_lifecycle_round_trips(ctx: &PgHarness) {
    let session = ctx.store.create_session().await.unwrap();
    assert!(session.is_open);

    let found = ctx.store.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(found.id, session.id);

    let closed = ctx.store.close_session(session.id).await.unwrap().unwrap();
    assert!(!closed.is_open);
    assert!(ctx.store.close_session(SessionId::new()).await.unwrap().is_none());
    assert!(ctx.store.find_session(SessionId::new()).await.unwrap().is_none());
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn results_list_newest_first(ctx: &PgHarness) {
    let session = ctx.store.create_session().await.unwrap();
    let first = ctx.store.insert_result(submission(session.id, 4)).await.unwrap();
    let second = ctx.store.insert_result(submission(session.id, 16)).await.unwrap();

    let listed = ctx.store.list_results(session.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn table_constraints_reject_inconsistent_rows(ctx: &PgHarness) {
    let session = ctx.store.create_session().await.unwrap();

    // bypass the store's own validation
    let outcome = sqlx::query(
        "INSERT INTO results (session_id, participant_label, heads, tails, sequence) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(session.id)
    .bind("liar")
    .bind(20_i32)
    .bind(0_i32)
    .bind("T".repeat(20))
    .execute(&ctx.db_pool)
    .await;
    assert!(outcome.is_err());

    let mut bad = submission(session.id, 10);
    bad.sequence = "X".repeat(20);
    assert!(ctx.store.insert_result(bad).await.is_err());
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn inserts_from_another_connection_reach_subscribers(ctx: &PgHarness) {
    let session = ctx.store.create_session().await.unwrap();
    let mut subscription = ctx.store.subscribe_to_new_results(session.id).await.unwrap();

    // written through the pool directly, as another process would
    let written = TossResult::create(&submission(session.id, 13), &ctx.db_pool)
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("no notification");
    assert_eq!(event, Some(FeedEvent::ResultInserted { result: written }));
    subscription.unsubscribe().await;
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn pipeline_follows_postgres_feed(ctx: &PgHarness) {
    let session = ctx.store.create_session().await.unwrap();
    ctx.store.insert_result(submission(session.id, 8)).await.unwrap();

    let pipeline = AggregationPipeline::spawn(ctx.store.clone());
    pipeline.activate(Some(session.id));
    crate::common::snapshot_when(&pipeline, |s| {
        s.realtime && !s.loading && s.aggregate.participant_count == 1
    })
    .await;

    ctx.store.insert_result(submission(session.id, 12)).await.unwrap();
    ctx.store.insert_result(submission(session.id, 10)).await.unwrap();
    let snapshot =
        crate::common::snapshot_when(&pipeline, |s| s.aggregate.participant_count == 3).await;
    assert_eq!(snapshot.aggregate.total_heads, 30);

    pipeline.shutdown().await;
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn health_check_passes(ctx: &PgHarness) {
    ctx.store.health_check().await.unwrap();
}
