//! Approach and rewind stages driving real commits.

use std::sync::Arc;

use serde_json::Value;
use waypoint_kernel::cache::CACHE_HIT;
use waypoint_kernel::{
    CacheStage, FnStage, NavError, Navigation, Outcome, Phase, Request, RequestStatus,
    TransitionCoordinator, TransitionPipeline,
};
use waypoint_platform::{AdapterError, MemCache, MemMirror, MemoryHistory};
use waypoint_testkit::{
    BlockOnce, Fail, Fixture, FlakyHistory, Recorder, Reject, RedirectTo, entries, fast_config,
    paths,
};

#[path = "helpers.rs"]
mod helpers;

use helpers::{approach, committed_path, rewind, stage, strs};

#[tokio::test]
async fn blocked_push_leaves_everything_untouched_until_confirmed() {
    let mut fx = Fixture::seeded(&["/a", "/b"], None, approach(vec![stage(BlockOnce::new())])).await;
    let before = serde_json::to_value(fx.nav.entries()).unwrap();
    let writes = fx.mirror.writes();

    let report = fx.nav.dispatch(Navigation::push("/c")).await.unwrap();
    assert_eq!(report.status, RequestStatus::Blocked);
    assert_eq!(report.entry, None);
    assert_eq!(serde_json::to_value(fx.nav.entries()).unwrap(), before);
    assert_eq!(fx.history.urls(), ["/a", "/b"]);
    assert_eq!(fx.mirror.writes(), writes);
    assert!(fx.nav.parked().is_some());

    let report = fx.nav.confirm(true).await.unwrap();
    assert!(report.committed());
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/c"]);
    assert_eq!(fx.history.urls(), ["/a", "/b", "/c"]);
    assert!(fx.nav.parked().is_none());

    // confirmed result matches an unguarded run of the same navigation
    let mut plain = Fixture::seeded(&["/a", "/b"], None, TransitionPipeline::new()).await;
    plain.nav.dispatch(Navigation::push("/c")).await.unwrap();
    assert_eq!(plain.paths(), fx.paths());
    assert_eq!(plain.nav.current_index(), fx.nav.current_index());
}

#[tokio::test]
async fn declined_confirmation_cancels() {
    let mut fx = Fixture::seeded(&["/a", "/b"], None, approach(vec![stage(BlockOnce::new())])).await;
    fx.nav.dispatch(Navigation::push("/c")).await.unwrap();

    let report = fx.nav.confirm(false).await.unwrap();
    assert_eq!(report.status, RequestStatus::Cancelled);
    assert_eq!(strs(&fx.paths()), ["/a", "/b"]);
    assert!(matches!(fx.nav.confirm(true).await, Err(NavError::NothingParked)));
}

#[tokio::test]
async fn a_new_navigation_discards_the_parked_one() {
    let mut fx = Fixture::seeded(&["/a", "/b"], None, approach(vec![stage(BlockOnce::new())])).await;
    fx.nav.dispatch(Navigation::push("/c")).await.unwrap();
    let report = fx.nav.dispatch(Navigation::push("/d")).await.unwrap();
    assert!(report.committed());
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/d"]);
    assert!(matches!(fx.nav.confirm(true).await, Err(NavError::NothingParked)));
}

#[tokio::test]
async fn approach_redirect_commits_the_new_target_only() {
    let pipeline = approach(vec![stage(RedirectTo::new("/old", "/new"))]);
    let mut fx = Fixture::seeded(&["/a", "/b"], None, pipeline).await;

    let report = fx.nav.dispatch(Navigation::push("/old")).await.unwrap();
    assert!(report.committed());
    assert_eq!(report.redirects, 1);
    assert_eq!(committed_path(&report), Some("/new"));
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/new"]);
    assert_eq!(fx.history.urls(), ["/a", "/b", "/new"]);
}

#[tokio::test]
async fn redirected_request_keeps_ambient_values() {
    let tag = FnStage::new("tag", |req: &mut Request| {
        let path = Value::String(req.target.segments.path.clone());
        req.ambient.entry("first_target").or_insert(path);
        Ok(Outcome::Continue)
    });
    let recorder = Recorder::new();
    let pipeline = approach(vec![
        stage(tag),
        stage(RedirectTo::new("/old", "/new")),
        stage(recorder.clone()),
    ]);
    let mut fx = Fixture::seeded(&["/a"], None, pipeline).await;

    fx.nav.dispatch(Navigation::replace("/old")).await.unwrap();
    let seen = recorder.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].target, "/new");
    assert_eq!(seen[0].ambient.get("first_target"), Some(&Value::from("/old")));
    assert_eq!(strs(&fx.paths()), ["/new"]);
}

#[tokio::test]
async fn redirect_loop_is_cut_off() {
    let pipeline = approach(vec![
        stage(RedirectTo::new("/x", "/y")),
        stage(RedirectTo::new("/y", "/x")),
    ]);
    let mut fx = Fixture::seeded(&["/a"], None, pipeline).await;

    let err = fx.nav.dispatch(Navigation::push("/x")).await.unwrap_err();
    assert!(matches!(err, NavError::RedirectLoop { limit: 5, .. }), "{err}");
    assert_eq!(strs(&fx.paths()), ["/a"]);
    assert_eq!(fx.history.urls(), ["/a"]);
}

#[tokio::test]
async fn rewind_redirect_runs_as_a_follow_up() {
    let pipeline = rewind(vec![stage(RedirectTo::new("/c", "/d"))]);
    let mut fx = Fixture::seeded(&["/a", "/b"], None, pipeline).await;

    let report = fx.nav.dispatch(Navigation::push("/c")).await.unwrap();
    assert!(report.committed());
    assert_eq!(committed_path(&report), Some("/c"));
    let follow_up = report.follow_up.as_deref().unwrap();
    assert!(follow_up.committed());
    assert_eq!(follow_up.redirects, 1);
    assert_eq!(committed_path(report.last()), Some("/d"));
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/c", "/d"]);
}

#[tokio::test]
async fn rewind_failures_do_not_undo_the_commit() {
    let mut fx = Fixture::seeded(&["/a"], None, rewind(vec![stage(Fail::new("/b"))])).await;

    let report = fx.nav.dispatch(Navigation::push("/b")).await.unwrap();
    assert!(report.committed());
    assert_eq!(report.rewind_errors, ["fail: refusing /b"]);
    assert_eq!(strs(&fx.paths()), ["/a", "/b"]);
}

#[tokio::test]
async fn approach_failure_keeps_the_stack() {
    let mut fx = Fixture::seeded(&["/a", "/b"], None, approach(vec![stage(Fail::new("/c"))])).await;

    let err = fx.nav.dispatch(Navigation::push("/c")).await.unwrap_err();
    match err {
        NavError::StageFailure { stage, .. } => assert_eq!(stage, "fail"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(strs(&fx.paths()), ["/a", "/b"]);
    assert_eq!(fx.history.urls(), ["/a", "/b"]);
    assert!(fx.nav.parked().is_none());
}

#[tokio::test]
async fn rewind_sees_previous_and_committed_entries() {
    let recorder = Recorder::new();
    let mut fx = Fixture::seeded(&["/a", "/b"], None, rewind(vec![stage(recorder.clone())])).await;

    fx.nav.dispatch(Navigation::jump(-1)).await.unwrap();
    let seen = recorder.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].phase, Phase::Rewind);
    assert_eq!(seen[0].previous.as_deref(), Some("/b"));
    assert_eq!(seen[0].committed.as_deref(), Some("/a"));
}

#[tokio::test]
async fn rejected_platform_write_rolls_back() {
    let inner = MemoryHistory::new("/a");
    let history = FlakyHistory::new(inner.clone());
    let mirror = MemMirror::new();
    let mut nav = TransitionCoordinator::builder(history.clone(), mirror.clone())
        .config(fast_config())
        .signals(inner.subscribe())
        .seed(entries(&["/a", "/b"]), None)
        .open()
        .await
        .unwrap();
    let record = mirror.record();

    history.set_failing(true);
    let err = nav.dispatch(Navigation::push("/c")).await.unwrap_err();
    assert!(matches!(err, NavError::Adapter(_)), "{err}");
    assert_eq!(paths(&nav), ["/a", "/b"]);
    assert_eq!(inner.urls(), ["/a", "/b"]);
    assert_eq!(mirror.record(), record);

    history.set_failing(false);
    nav.dispatch(Navigation::push("/c")).await.unwrap();
    assert_eq!(paths(&nav), ["/a", "/b", "/c"]);
    assert_eq!(mirror.record().unwrap().entries.len(), 3);
}

struct Flaky {
    history: FlakyHistory,
    inner: MemoryHistory,
    mirror: MemMirror,
    nav: TransitionCoordinator,
}

async fn flaky(seed: &[&str], pipeline: TransitionPipeline) -> Flaky {
    let inner = MemoryHistory::new(seed[0]);
    let history = FlakyHistory::new(inner.clone());
    let mirror = MemMirror::new();
    let nav = TransitionCoordinator::builder(history.clone(), mirror.clone())
        .config(fast_config())
        .pipeline(pipeline)
        .signals(inner.subscribe())
        .seed(entries(seed), None)
        .open()
        .await
        .unwrap();
    Flaky {
        history,
        inner,
        mirror,
        nav,
    }
}

#[tokio::test]
async fn jump_survives_a_rejected_restamp() {
    let mut fx = flaky(&["/a", "/b", "/c"], TransitionPipeline::new()).await;
    fx.history.reject(Reject::Writes);

    let report = fx.nav.dispatch(Navigation::jump(-1)).await.unwrap();
    assert!(report.committed());
    assert_eq!(fx.nav.current_index(), 1);
    assert_eq!(fx.inner.index(), 1);
    assert!(fx.nav.settle().await.unwrap().is_empty());
    assert_eq!(fx.mirror.record().unwrap().index, 1);
}

#[tokio::test]
async fn rejected_reset_walks_the_platform_back() {
    let mut fx = flaky(&["/a", "/b", "/c"], TransitionPipeline::new()).await;
    fx.nav.dispatch(Navigation::jump(-1)).await.unwrap();
    fx.history.reject(Reject::Writes);

    let err = fx.nav.reset(entries(&["/x", "/y"]), None, None).await.unwrap_err();
    assert!(matches!(err, NavError::Adapter(AdapterError::Platform(_))), "{err}");
    assert_eq!(paths(&fx.nav), ["/a", "/b", "/c"]);
    assert_eq!(fx.nav.current_index(), 1);
    assert_eq!(fx.inner.index(), 1);
    assert_eq!(fx.inner.urls(), ["/a", "/b", "/c"]);
    assert!(fx.nav.settle().await.unwrap().is_empty());
    assert_eq!(fx.nav.current_index(), 1);
}

#[tokio::test]
async fn half_written_reset_keeps_what_the_platform_kept() {
    let mut fx = flaky(&["/a", "/b", "/c"], TransitionPipeline::new()).await;
    fx.history.reject(Reject::PushesAfter(1));

    let err = fx
        .nav
        .reset(entries(&["/x", "/y", "/z"]), None, None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, NavError::Adapter(AdapterError::Partial { written: 2, .. })),
        "{err}"
    );
    assert_eq!(paths(&fx.nav), ["/x", "/y"]);
    assert_eq!(fx.nav.current_index(), 1);
    assert_eq!(fx.inner.urls(), ["/x", "/y"]);
    assert_eq!(fx.inner.index(), 1);
    assert_eq!(fx.mirror.record().unwrap().entries.len(), 2);
    assert!(fx.nav.settle().await.unwrap().is_empty());

    // the surviving entries are fully ours again
    fx.history.reject(Reject::Nothing);
    fx.inner.back();
    let reports = fx.nav.settle().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(committed_path(&reports[0]), Some("/x"));
    assert_eq!(fx.nav.current_index(), 0);
}

#[tokio::test]
async fn confirmed_pop_survives_a_rejected_restamp() {
    let mut fx = flaky(&["/a", "/b", "/c"], approach(vec![stage(BlockOnce::new())])).await;

    fx.inner.back();
    let report = fx.nav.next_pop().await.unwrap().unwrap();
    assert_eq!(report.status, RequestStatus::Blocked);
    assert_eq!(fx.inner.index(), 2);

    fx.history.reject(Reject::Writes);
    let report = fx.nav.confirm(true).await.unwrap();
    assert!(report.committed());
    assert_eq!(committed_path(&report), Some("/b"));
    assert_eq!(fx.nav.current_index(), 1);
    assert_eq!(fx.inner.index(), 1);
    assert!(fx.nav.settle().await.unwrap().is_empty());
}

#[tokio::test]
async fn cache_stage_reports_hits_for_committed_routes() {
    let cache = MemCache::new();
    let cached = stage(CacheStage::new(Arc::new(cache.clone())));
    let recorder = Recorder::new();
    let pipeline = TransitionPipeline::from_stages(
        vec![Arc::clone(&cached), stage(recorder.clone())],
        vec![cached],
    );
    let mut fx = Fixture::seeded(&["/a", "/b"], None, pipeline).await;

    fx.nav.dispatch(Navigation::push("/c")).await.unwrap();
    fx.nav.dispatch(Navigation::jump(-1)).await.unwrap();
    fx.nav.dispatch(Navigation::jump(1)).await.unwrap();

    let hits: Vec<_> = recorder
        .seen()
        .iter()
        .map(|seen| (seen.target.clone(), seen.ambient.get(CACHE_HIT).cloned()))
        .collect();
    assert_eq!(
        hits,
        [
            ("/c".to_owned(), Some(Value::Bool(false))),
            ("/b".to_owned(), Some(Value::Bool(false))),
            ("/c".to_owned(), Some(Value::Bool(true))),
        ]
    );
    assert_eq!(cache.len(), 2);
}
