//! Live aggregation against the in-memory store and its change feed.

mod common;

use std::collections::HashSet;

use crate::common::{detached_row, snapshot_when, submission, RiggedCoin, TestHarness};
use coin_toss_core::common::ResultId;
use coin_toss_core::domains::aggregation::AggregationPipeline;
use coin_toss_core::domains::sessions::SessionHost;
use coin_toss_core::domains::statistics::binomial_p_value_two_sided;
use coin_toss_core::kernel::BaseExperimentStore;
use test_context::test_context;
use url::Url;

fn ids(pipeline: &AggregationPipeline) -> HashSet<ResultId> {
    pipeline.current().recent.iter().map(|r| r.id).collect()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn feed_during_bulk_load_and_redelivery_merge_by_id(ctx: &TestHarness) {
    let session = ctx.store.create_session().await.unwrap();
    let a = ctx.store.insert_result(submission(session.id, 6)).await.unwrap();
    let b = ctx.store.insert_result(submission(session.id, 11)).await.unwrap();

    ctx.store.gate_listing();
    let pipeline = ctx.pipeline();
    pipeline.activate(Some(session.id));
    snapshot_when(&pipeline, |s| s.realtime && s.loading).await;

    // C reaches the feed while the bulk load is still held
    let c = detached_row(session.id, 14);
    ctx.store.redeliver(&c).await;
    snapshot_when(&pipeline, |s| s.aggregate.participant_count == 1).await;

    ctx.store.release_listing();
    snapshot_when(&pipeline, |s| !s.loading && s.aggregate.participant_count == 3).await;

    // B again, as an at-least-once feed may
    ctx.store.redeliver(&b).await;
    ctx.store.redeliver(&c).await;
    ctx.settle().await;
    let snapshot = pipeline.current();

    assert_eq!(snapshot.aggregate.participant_count, 3);
    assert_eq!(ids(&pipeline), HashSet::from([a.id, b.id, c.id]));
    assert_eq!(snapshot.aggregate.total_heads, 6 + 11 + 14);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn switching_sessions_drops_stale_events_and_loads(ctx: &TestHarness) {
    let s1 = ctx.store.create_session().await.unwrap();
    let s2 = ctx.store.create_session().await.unwrap();
    let old = ctx.store.insert_result(submission(s1.id, 3)).await.unwrap();
    let kept = ctx.store.insert_result(submission(s2.id, 17)).await.unwrap();

    // the S1 load is still held when S2 is activated, so it never lands
    ctx.store.gate_listing();
    let pipeline = ctx.pipeline();
    pipeline.activate(Some(s1.id));
    snapshot_when(&pipeline, |s| s.session_id() == Some(s1.id) && s.loading).await;
    pipeline.activate(Some(s2.id));
    snapshot_when(&pipeline, |s| s.session_id() == Some(s2.id) && s.loading).await;

    ctx.store.redeliver(&old).await;
    ctx.store.release_listing();
    ctx.store.release_listing();
    let snapshot = snapshot_when(&pipeline, |s| !s.loading).await;

    ctx.store.insert_result(submission(s1.id, 5)).await.unwrap();
    ctx.store.redeliver(&old).await;
    tokio::task::yield_now().await;

    let snapshot_after = pipeline.current();
    for view in [&snapshot, &snapshot_after] {
        assert_eq!(view.session_id(), Some(s2.id));
        assert_eq!(view.aggregate.participant_count, 1);
        assert_eq!(view.recent[0].id, kept.id);
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn three_participants_end_to_end(ctx: &TestHarness) {
    let mut host = SessionHost::new(
        ctx.store.clone(),
        Url::parse(crate::common::BASE_URL).unwrap(),
    );
    let session_id = host.open_session().await.unwrap().id;

    let pipeline = ctx.pipeline();
    pipeline.activate(Some(session_id));
    snapshot_when(&pipeline, |s| s.realtime && !s.loading).await;

    for heads in [8, 12, 10] {
        let mut participant = ctx
            .participant_on_new_device(&session_id.to_string())
            .await
            .with_coin(RiggedCoin::boxed(heads));
        while participant.flip().is_some() {}
        participant.submit(&format!("p{}", heads)).await.unwrap();
    }

    let snapshot = snapshot_when(&pipeline, |s| s.aggregate.participant_count == 3).await;
    let aggregate = snapshot.aggregate;
    assert_eq!(aggregate.total_trials, 60);
    assert_eq!(aggregate.total_heads, 30);
    assert_eq!(aggregate.p_value, Some(binomial_p_value_two_sided(60, 30, 0.5)));
    assert!((aggregate.p_value.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(aggregate.histogram[8], 1);
    assert_eq!(aggregate.histogram[10], 1);
    assert_eq!(aggregate.histogram[12], 1);
    assert_eq!(snapshot.recent[0].heads, 10);

    host.close_session().await.unwrap();
    pipeline.shutdown().await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn recent_is_capped_at_twenty(ctx: &TestHarness) {
    let session = ctx.store.create_session().await.unwrap();
    for i in 0..25 {
        ctx.store
            .insert_result(submission(session.id, i % 21))
            .await
            .unwrap();
    }

    let pipeline = ctx.pipeline();
    pipeline.activate(Some(session.id));
    let snapshot = snapshot_when(&pipeline, |s| !s.loading && s.aggregate.participant_count == 25).await;
    assert_eq!(snapshot.recent.len(), 20);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dropping_the_pipeline_releases_the_feed(ctx: &TestHarness) {
    let session = ctx.store.create_session().await.unwrap();
    let pipeline = ctx.pipeline();
    pipeline.activate(Some(session.id));
    snapshot_when(&pipeline, |s| s.realtime).await;
    assert_eq!(ctx.store.hub().topic_count().await, 1);

    pipeline.shutdown().await;
    assert_eq!(ctx.store.hub().topic_count().await, 0);
}
