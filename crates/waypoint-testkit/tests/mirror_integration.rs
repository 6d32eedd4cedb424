//! Restoring the stack after a restart from the mirror or the entry blobs.

use waypoint_kernel::{
    CoordinatorConfig, MirrorAuthority, Navigation, TransitionCoordinator, TransitionPipeline,
};
use waypoint_platform::{
    AdapterMode, FsMirror, MemMirror, MemoryHistory, MirrorRecord, MirrorStore,
};
use waypoint_testkit::{Fixture, entries, fast_config, paths};
use waypoint_types::{Entry, EntryStack};

#[path = "helpers.rs"]
mod helpers;

use helpers::strs;

async fn open<M: MirrorStore + 'static>(
    history: &MemoryHistory,
    mirror: M,
    config: CoordinatorConfig,
    seed: Option<&[&str]>,
) -> TransitionCoordinator {
    let mut builder = TransitionCoordinator::builder(history.clone(), mirror)
        .config(config)
        .signals(history.subscribe());
    if let Some(seed) = seed {
        builder = builder.seed(entries(seed), None);
    }
    builder.open().await.unwrap()
}

fn snapshot(nav: &TransitionCoordinator) -> (serde_json::Value, usize) {
    (serde_json::to_value(nav.entries()).unwrap(), nav.current_index())
}

#[tokio::test]
async fn memory_mirror_survives_restart() {
    let mut fx = Fixture::seeded(&["/a", "/b", "/c"], Some(1), TransitionPipeline::new()).await;
    fx.nav.dispatch(Navigation::push("/d")).await.unwrap();
    let before = snapshot(&fx.nav);

    let fx = fx.reload(TransitionPipeline::new()).await;
    assert_eq!(fx.nav.authority(), MirrorAuthority::Store);
    assert_eq!(snapshot(&fx.nav), before);
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/d"]);
}

#[tokio::test]
async fn fs_mirror_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let history = MemoryHistory::new("/");
    let mut nav = open(
        &history,
        FsMirror::open(dir.path(), "tab-1").unwrap(),
        fast_config(),
        Some(&["/inbox", "/inbox/42"]),
    )
    .await;
    nav.dispatch(Navigation::jump(-1)).await.unwrap();
    let before = snapshot(&nav);
    drop(nav);

    let nav = open(&history, FsMirror::open(dir.path(), "tab-1").unwrap(), fast_config(), None).await;
    assert_eq!(nav.authority(), MirrorAuthority::Store);
    assert_eq!(snapshot(&nav), before);
    assert_eq!(nav.current_index(), 0);
}

#[tokio::test]
async fn stale_mirror_record_loses_to_the_landed_entry() {
    let fx = Fixture::seeded(&["/a", "/b"], None, TransitionPipeline::new()).await;
    let before = snapshot(&fx.nav);
    let other = EntryStack::new(Entry::at_path("/elsewhere"));
    fx.mirror.write(&MirrorRecord::from_stack(&other)).unwrap();

    let fx = fx.reload(TransitionPipeline::new()).await;
    assert_eq!(snapshot(&fx.nav), before);
}

#[tokio::test]
async fn unavailable_mirror_restores_from_entry_blobs() {
    let history = MemoryHistory::new("/");
    let mirror = MemMirror::unavailable();
    let mut nav = open(&history, mirror.clone(), fast_config(), Some(&["/a", "/b", "/c"])).await;
    assert_eq!(nav.authority(), MirrorAuthority::EntryBlob);
    nav.dispatch(Navigation::jump(-1)).await.unwrap();
    let before = snapshot(&nav);
    drop(nav);

    let nav = open(&history, mirror.clone(), fast_config(), None).await;
    assert_eq!(nav.authority(), MirrorAuthority::EntryBlob);
    assert_eq!(snapshot(&nav), before);
    assert_eq!(mirror.writes(), 0);
}

#[tokio::test]
async fn without_embedded_stacks_only_the_landed_entry_survives() {
    let config = CoordinatorConfig {
        embed_stack_in_blob: false,
        ..fast_config()
    };
    let history = MemoryHistory::new("/");
    let nav = open(&history, MemMirror::unavailable(), config.clone(), Some(&["/a", "/b"])).await;
    let key = nav.current().key.clone();
    drop(nav);

    let nav = open(&history, MemMirror::unavailable(), config, None).await;
    assert_eq!(paths(&nav), ["/b"]);
    assert_eq!(nav.current().key, key);
}

#[tokio::test]
async fn failing_mirror_hands_authority_to_entry_blobs() {
    let mut fx = Fixture::seeded(&["/a"], None, TransitionPipeline::new()).await;
    assert_eq!(fx.nav.authority(), MirrorAuthority::Store);

    fx.mirror.set_available(false);
    let report = fx.nav.dispatch(Navigation::push("/b")).await.unwrap();
    assert!(report.committed());
    assert_eq!(fx.nav.authority(), MirrorAuthority::EntryBlob);

    fx.mirror.set_available(true);
    let writes = fx.mirror.writes();
    fx.nav.dispatch(Navigation::push("/c")).await.unwrap();
    assert_eq!(fx.mirror.writes(), writes);
    assert_eq!(strs(&fx.paths()), ["/a", "/b", "/c"]);
}

#[tokio::test]
async fn degraded_mode_keeps_the_stack_in_memory() {
    let history = MemoryHistory::without_history_support("/a");
    let mut nav = open(&history, MemMirror::new(), fast_config(), Some(&["/a", "/b"])).await;
    assert_eq!(nav.mode(), AdapterMode::Degraded);

    nav.dispatch(Navigation::push("/c")).await.unwrap();
    nav.dispatch(Navigation::jump(-2)).await.unwrap();
    assert_eq!(paths(&nav), ["/a", "/b", "/c"]);
    assert_eq!(nav.current_index(), 0);
    assert!(history.calls().is_empty());
    assert_eq!(history.urls(), ["/a"]);
}
