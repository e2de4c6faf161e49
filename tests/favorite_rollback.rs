//! Favorite toggles through the full engine: optimistic flip, persistence,
//! rollback on write failure, and the guest rejection path.

mod common;

use common::{deps, quest, wait_for_view, RejectingStore, ScriptedResponse, ScriptedService};
use sidequest::config::DiscoveryConfig;
use sidequest::engine::start_engine;
use sidequest::storage::{DocumentStore, SledDocumentStore, SledDocumentStoreBuilder};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Block until the user's favorite rows are durably visible in the store,
/// so a follow-up session is guaranteed to hydrate them.
async fn wait_for_favorite_rows(store: &Arc<SledDocumentStore>, user: &str) {
    for _ in 0..100 {
        let rows = store
            .query_by_field("favorites", "user_id", user)
            .await
            .expect("query");
        if !rows.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("favorite write never landed for {user}");
}

fn one_quest_service() -> Arc<ScriptedService> {
    Arc::new(ScriptedService::new(vec![ScriptedResponse::quests(vec![
        quest("q1", "Cafe Crawl", 15.0, 90),
    ])]))
}

#[tokio::test]
async fn favorite_survives_restart_when_write_succeeds() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        SledDocumentStoreBuilder::new(dir.path())
            .open()
            .expect("store"),
    );

    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(one_quest_service(), store.clone(), Some("u1")),
    );
    wait_for_view(&handle, 2000, |v| !v.loading && v.fetched_count > 0).await;

    handle.toggle_favorite("q1");
    let view = wait_for_view(&handle, 2000, |v| !v.favorite_ids.is_empty()).await;
    assert_eq!(view.favorite_ids, vec!["q1".to_string()]);
    assert!(view.notice.is_none());
    wait_for_favorite_rows(&store, "u1").await;
    handle.shutdown().await;

    // A second session for the same user hydrates the favorite back.
    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(one_quest_service(), store, Some("u1")),
    );
    let view = wait_for_view(&handle, 2000, |v| !v.favorite_ids.is_empty()).await;
    assert_eq!(view.favorite_ids, vec!["q1".to_string()]);
    handle.shutdown().await;
}

#[tokio::test]
async fn hydrated_favorite_unfavorites_without_a_matching_fetch() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        SledDocumentStoreBuilder::new(dir.path())
            .open()
            .expect("store"),
    );

    // Session one favorites q1.
    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(one_quest_service(), store.clone(), Some("u1")),
    );
    wait_for_view(&handle, 2000, |v| !v.loading && v.fetched_count > 0).await;
    handle.toggle_favorite("q1");
    wait_for_favorite_rows(&store, "u1").await;
    handle.shutdown().await;

    // Session two fetches a collection that no longer contains q1; the
    // hydrated favorite must still be removable via its stored snapshot.
    let service = Arc::new(ScriptedService::new(vec![ScriptedResponse::quests(vec![
        quest("q9", "Harbour Walk", 0.0, 45),
    ])]));
    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(service, store, Some("u1")),
    );
    let view = wait_for_view(&handle, 2000, |v| {
        !v.loading && v.fetched_count > 0 && !v.favorite_ids.is_empty()
    })
    .await;
    assert_eq!(view.favorite_ids, vec!["q1".to_string()]);
    assert!(view.quests.iter().all(|q| q.id != "q1"), "q1 left the collection");

    handle.toggle_favorite("q1");
    let view = wait_for_view(&handle, 2000, |v| v.favorite_ids.is_empty()).await;
    assert!(view.favorite_ids.is_empty());
    assert!(view.notice.is_none());
    handle.shutdown().await;
}

#[tokio::test]
async fn failed_write_rolls_the_toggle_back() {
    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(one_quest_service(), Arc::new(RejectingStore), Some("u1")),
    );
    wait_for_view(&handle, 2000, |v| !v.loading && v.fetched_count > 0).await;

    handle.toggle_favorite("q1");
    let view = wait_for_view(&handle, 2000, |v| v.notice.is_some()).await;
    assert!(view.favorite_ids.is_empty(), "optimistic flip undone");
    assert!(view.notice.expect("notice").contains("undone"));

    // The per-item slot was released; a retry is allowed (and fails again).
    handle.toggle_favorite("q1");
    let view = wait_for_view(&handle, 2000, |v| v.notice.is_some()).await;
    assert!(view.favorite_ids.is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn guest_toggle_is_rejected_cleanly() {
    let handle = start_engine(
        DiscoveryConfig::default(),
        deps(one_quest_service(), Arc::new(RejectingStore), None),
    );
    wait_for_view(&handle, 2000, |v| !v.loading && v.fetched_count > 0).await;

    handle.toggle_favorite("q1");
    let view = wait_for_view(&handle, 2000, |v| v.notice.is_some()).await;
    assert!(view.favorite_ids.is_empty());
    assert!(view.notice.expect("notice").contains("sign in"));
    handle.shutdown().await;
}
