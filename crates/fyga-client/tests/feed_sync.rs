//! End-to-end tests for the feed synchronization core against `MemoryStore`.
//!
//! # Tiers
//!
//! - **Tier 1:** Subscriptions: wholesale replacement, one live listener
//!   across tab switches, the empty Followed feed, failure and retry
//! - **Tier 2:** Optimistic mutations: like rollback, like round trip,
//!   conflict exhaustion, effects outliving the feed, follow with profile
//!   reconciliation (including overlapping reloads)
//! - **Tier 3:** Reload-driven writes: comments and post publishing
//! - **Tier 4:** Identity: unauthenticated viewing and rejected mutations

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fyga_client::constants::{POSTS, fields};
use fyga_client::graph::{post_ref, user_ref};
use fyga_client::{
    ClientConfig, FeedClient, FeedError, FeedStatus, FeedViewState, MutationEvent, SocialGraph,
    StaticSession, fetch_profile, register_profile,
};
use fyga_store::{
    DEFAULT_MAX_TRANSACTION_ATTEMPTS, DocRef, Document, DocumentStore, FieldPatch, Fields,
    MemoryStore, Query, StoreError, Subscription, TransactionFn,
};
use fyga_types::{FeedTab, IdSet, NewPost, Post, PostId, ProfileDraft, UserId};
use serde_json::json;

// ============================================================================
// Shared test setup
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// Store with three registered users (u1 ana, u2 bia, u3 cris), one post by
/// each of u2 and u3, and u1 following u2.
async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let config = ClientConfig::default();
    for (id, name) in [("u1", "ana"), ("u2", "bia"), ("u3", "cris")] {
        register_profile(
            store.as_ref(),
            &config.profile,
            &UserId::new(id),
            ProfileDraft {
                username: name.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }
    add_post(&store, "u2", "bia at dusk").await;
    add_post(&store, "u3", "cris at dawn").await;
    SocialGraph::new(store.clone())
        .follow(&UserId::new("u1"), &UserId::new("u2"))
        .await
        .unwrap();
    store
}

async fn add_post(store: &MemoryStore, author: &str, description: &str) -> PostId {
    let id = store
        .add(
            POSTS,
            FieldPatch::new()
                .set(fields::USER_ID, author)
                .set("description", description)
                .server_timestamp(fields::TIMESTAMP),
        )
        .await
        .unwrap();
    PostId::new(id)
}

fn client_for(store: &Arc<MemoryStore>, user: Option<&str>) -> FeedClient {
    let session = match user {
        Some(u) => StaticSession::signed_in(u),
        None => StaticSession::anonymous(),
    };
    FeedClient::new(store.clone(), Arc::new(session), ClientConfig::default())
}

async fn wait_for(
    client: &FeedClient,
    pred: impl FnMut(&FeedViewState) -> bool,
) -> FeedViewState {
    let mut rx = client.state().subscribe();
    let view = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for view state")
        .expect("state cell dropped");
    (*view).clone()
}

fn descriptions(view: &FeedViewState) -> Vec<&str> {
    view.posts.iter().map(|p| p.description.as_str()).collect()
}

async fn stored_post(store: &MemoryStore, id: &PostId) -> Post {
    store
        .get(&post_ref(id))
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap()
}

/// Wraps a `MemoryStore`; the next `n` reads of `doc` are taken immediately
/// but handed back only after `delay`, so the caller sees an old value late.
struct LaggingReads {
    inner: Arc<MemoryStore>,
    doc: DocRef,
    delay: Duration,
    remaining: AtomicU32,
}

impl LaggingReads {
    fn new(inner: Arc<MemoryStore>, doc: DocRef, delay: Duration) -> Self {
        Self {
            inner,
            doc,
            delay,
            remaining: AtomicU32::new(0),
        }
    }

    fn lag_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for LaggingReads {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        let result = self.inner.get(doc).await;
        let lag = doc == &self.doc
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if lag {
            tokio::time::sleep(self.delay).await;
        }
        result
    }

    async fn add(&self, collection: &str, patch: FieldPatch) -> Result<String, StoreError> {
        self.inner.add(collection, patch).await
    }

    async fn set(&self, doc: &DocRef, fields: Fields) -> Result<(), StoreError> {
        self.inner.set(doc, fields).await
    }

    async fn update(&self, doc: &DocRef, patch: FieldPatch) -> Result<(), StoreError> {
        self.inner.update(doc, patch).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.query(query).await
    }

    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.inner.subscribe(query)
    }

    async fn transaction(&self, reads: Vec<DocRef>, body: TransactionFn) -> Result<(), StoreError> {
        self.inner.transaction(reads, body).await
    }
}

// ============================================================================
// Tier 1: Subscriptions
// ============================================================================

#[tokio::test]
async fn test_global_feed_is_newest_first() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;

    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(descriptions(&view), ["cris at dawn", "bia at dusk"]);
    assert_eq!(view.tab, FeedTab::Global);
}

#[tokio::test]
async fn test_emission_replaces_local_list_wholesale() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.posts.len() == 2).await;

    // A local-only edit that the store knows nothing about.
    client.state().update(|s| {
        s.posts.push(Post {
            id: PostId::new("phantom"),
            description: "phantom".into(),
            ..Default::default()
        })
    });

    add_post(&store, "u2", "bia again").await;
    let view = wait_for(&client, |s| s.posts.iter().any(|p| p.description == "bia again")).await;
    assert_eq!(descriptions(&view), ["bia again", "cris at dawn", "bia at dusk"]);
    assert!(view.post(&PostId::new("phantom")).is_none());
}

#[tokio::test]
async fn test_malformed_post_is_skipped() {
    let store = seeded_store().await;
    store
        .set(
            &DocRef::new(POSTS, "broken"),
            json!({ "timestamp": 1, "likedBy": 42 }).as_object().cloned().unwrap(),
        )
        .await
        .unwrap();
    let client = client_for(&store, Some("u1"));
    client.start().await;

    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(view.posts.len(), 2);
}

#[tokio::test]
async fn test_tab_switch_keeps_one_listener() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.status == FeedStatus::Ready && s.profile.is_some()).await;
    assert_eq!(store.listener_count(), 1);

    assert!(client.select_tab(FeedTab::Followed));
    assert_eq!(store.listener_count(), 1);
    let view = wait_for(&client, |s| {
        s.tab == FeedTab::Followed && s.status == FeedStatus::Ready
    })
    .await;
    assert_eq!(descriptions(&view), ["bia at dusk"]);

    // Posts outside the new query never reach the view.
    add_post(&store, "u3", "cris again").await;
    add_post(&store, "u2", "bia again").await;
    let view = wait_for(&client, |s| s.posts.iter().any(|p| p.description == "bia again")).await;
    assert_eq!(descriptions(&view), ["bia again", "bia at dusk"]);

    assert!(client.select_tab(FeedTab::Global));
    assert_eq!(store.listener_count(), 1);
    let view = wait_for(&client, |s| s.tab == FeedTab::Global && s.posts.len() == 4).await;
    assert_eq!(view.posts[0].description, "bia again");
}

#[tokio::test]
async fn test_selecting_current_tab_is_noop() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let generation = client.view().generation;

    assert!(!client.select_tab(FeedTab::Global));
    assert_eq!(client.view().generation, generation);
    assert_eq!(store.subscribe_count(), 1);
}

#[tokio::test]
async fn test_followed_with_nobody_followed_issues_no_query() {
    let store = seeded_store().await;
    // u3 follows nobody.
    let client = client_for(&store, Some("u3"));
    client.start().await;
    wait_for(&client, |s| s.profile.is_some()).await;
    let subscribes = store.subscribe_count();

    client.select_tab(FeedTab::Followed);
    let view = client.view();
    assert_eq!(view.status, FeedStatus::Ready);
    assert!(view.posts.is_empty());
    assert_eq!(store.subscribe_count(), subscribes);
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_subscription_failure_then_retry() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.status == FeedStatus::Ready).await;

    store.break_listeners(POSTS, "connection reset");
    let view = wait_for(&client, |s| matches!(s.status, FeedStatus::Failed(_))).await;
    assert!(view.error_message.is_some());
    // Last good list stays visible.
    assert_eq!(view.posts.len(), 2);

    client.retry();
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert!(view.error_message.is_none());
    assert_eq!(store.listener_count(), 1);
}

#[tokio::test]
async fn test_deactivate_releases_listener() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    assert_eq!(store.listener_count(), 1);
    client.deactivate();
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_tab_switch_drops_previous_posts() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.posts.len() == 2 && s.profile.is_some()).await;

    client.select_tab(FeedTab::Followed);
    let view = client.view();
    assert_eq!(view.tab, FeedTab::Followed);
    assert_eq!(view.status, FeedStatus::Loading);
    assert!(view.posts.is_empty());

    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(descriptions(&view), ["bia at dusk"]);
}

// ============================================================================
// Tier 2: Optimistic mutations
// ============================================================================

#[tokio::test]
async fn test_like_rollback_restores_exact_list() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let before = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    let target = before.posts[0].id.clone();
    let mut events = client.subscribe_events();

    store.fail_next_transactions(1);
    let handle = client.toggle_like(&target).unwrap();
    let optimistic = client.view();
    assert!(optimistic.is_liked(optimistic.post(&target).unwrap()));

    assert!(handle.wait().await.is_err());
    assert_eq!(client.view().posts, before.posts);
    assert!(matches!(
        events.recv().await.unwrap(),
        MutationEvent::RolledBack { .. }
    ));
}

#[tokio::test]
async fn test_like_twice_restores_membership() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    let target = view.posts[0].id.clone();
    let original = stored_post(&store, &target).await.liked_by;

    client.toggle_like(&target).unwrap().wait().await.unwrap();
    assert!(stored_post(&store, &target).await.is_liked_by(&UserId::new("u1")));
    let view = wait_for(&client, |s| s.post(&target).is_some_and(|p| !p.liked_by.is_empty())).await;
    assert!(view.is_liked(view.post(&target).unwrap()));

    client.toggle_like(&target).unwrap().wait().await.unwrap();
    assert_eq!(stored_post(&store, &target).await.liked_by, original);
}

#[tokio::test]
async fn test_follow_toggle_updates_both_sides_and_reloads_profile() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.profile.is_some()).await;
    let u3 = UserId::new("u3");
    assert!(!client.view().is_following(&u3));

    let handle = client.toggle_follow(&u3).unwrap();
    assert!(client.view().is_following(&u3));
    handle.wait().await.unwrap();

    let me = fetch_profile(store.as_ref(), &UserId::new("u1")).await.unwrap().unwrap();
    let them = fetch_profile(store.as_ref(), &u3).await.unwrap().unwrap();
    assert!(me.is_following(&u3));
    assert!(them.is_followed_by(&UserId::new("u1")));
    assert_eq!(client.view().profile.unwrap().following, me.following);

    client.toggle_follow(&u3).unwrap().wait().await.unwrap();
    let me = fetch_profile(store.as_ref(), &UserId::new("u1")).await.unwrap().unwrap();
    let them = fetch_profile(store.as_ref(), &u3).await.unwrap().unwrap();
    assert!(!me.is_following(&u3));
    assert!(!them.is_followed_by(&UserId::new("u1")));
    assert!(!client.view().is_following(&u3));
}

#[tokio::test]
async fn test_follow_failure_restores_profile() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let before = wait_for(&client, |s| s.profile.is_some()).await.profile;

    store.fail_next_transactions(1);
    let handle = client.toggle_follow(&UserId::new("u3")).unwrap();
    assert!(handle.wait().await.is_err());
    assert_eq!(client.view().profile, before);
}

#[tokio::test]
async fn test_follow_refreshes_followed_feed() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.profile.is_some()).await;
    client.select_tab(FeedTab::Followed);
    wait_for(&client, |s| s.tab == FeedTab::Followed && s.posts.len() == 1).await;

    client.toggle_follow(&UserId::new("u3")).unwrap().wait().await.unwrap();
    let view = wait_for(&client, |s| s.posts.len() == 2).await;
    assert_eq!(descriptions(&view), ["cris at dawn", "bia at dusk"]);
    assert_eq!(store.listener_count(), 1);
}

#[tokio::test]
async fn test_follow_requires_loaded_profile() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    assert!(matches!(
        client.toggle_follow(&UserId::new("u2")),
        Err(FeedError::NotFound(_))
    ));
    assert!(matches!(
        client.toggle_follow(&UserId::new("u1")),
        Err(FeedError::Validation(_))
    ));
}

#[tokio::test]
async fn test_like_conflict_exhaustion_rolls_back() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let before = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    let target = before.posts[0].id.clone();
    let mut events = client.subscribe_events();

    store.force_conflicts(DEFAULT_MAX_TRANSACTION_ATTEMPTS);
    let result = client.toggle_like(&target).unwrap().wait().await;
    assert_eq!(
        result,
        Err(FeedError::TransactionConflictExceeded {
            attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS
        })
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        MutationEvent::RolledBack {
            error: FeedError::TransactionConflictExceeded { .. },
            ..
        }
    ));
    assert_eq!(client.view().posts, before.posts);
    assert!(stored_post(&store, &target).await.liked_by.is_empty());
}

#[tokio::test]
async fn test_like_in_flight_outlives_deactivate() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    let target = view.posts[0].id.clone();

    let handle = client.toggle_like(&target).unwrap();
    client.deactivate();
    assert_eq!(store.listener_count(), 0);

    handle.wait().await.unwrap();
    assert!(stored_post(&store, &target).await.is_liked_by(&UserId::new("u1")));
}

#[tokio::test]
async fn test_rollback_still_applies_after_deactivate() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let before = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    let target = before.posts[0].id.clone();

    store.fail_next_transactions(1);
    let handle = client.toggle_like(&target).unwrap();
    client.deactivate();

    assert!(handle.wait().await.is_err());
    let view = client.view();
    assert_eq!(view.status, FeedStatus::Idle);
    assert_eq!(view.posts, before.posts);
}

#[tokio::test]
async fn test_overlapping_follow_reloads_keep_newest_profile() {
    let store = seeded_store().await;
    let me = UserId::new("u1");
    let lagging = Arc::new(LaggingReads::new(
        store.clone(),
        user_ref(&me),
        Duration::from_millis(300),
    ));
    let client = FeedClient::new(
        lagging.clone(),
        Arc::new(StaticSession::signed_in("u1")),
        ClientConfig::default(),
    );
    client.start().await;
    wait_for(&client, |s| s.profile.is_some()).await;

    // The first reconcile's profile read comes back last.
    lagging.lag_next(1);
    let (u2, u3) = (UserId::new("u2"), UserId::new("u3"));
    let follow_u3 = client.toggle_follow(&u3).unwrap();
    let unfollow_u2 = client.toggle_follow(&u2).unwrap();
    follow_u3.wait().await.unwrap();
    unfollow_u2.wait().await.unwrap();

    let stored = fetch_profile(store.as_ref(), &me).await.unwrap().unwrap();
    assert_eq!(stored.following, [u3.clone()].into_iter().collect::<IdSet<_>>());
    let view = client.view();
    assert_eq!(view.profile.unwrap().following, stored.following);
}

// ============================================================================
// Tier 3: Reload-driven writes
// ============================================================================

#[tokio::test]
async fn test_comment_arrives_through_subscription() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready && s.profile.is_some()).await;
    let target = view.posts[0].id.clone();

    let handle = client.add_comment(&target, "lovely").unwrap();
    // Never spliced in locally.
    assert!(client.view().post(&target).unwrap().comments.is_empty());
    handle.wait().await.unwrap();

    let view = wait_for(&client, |s| s.post(&target).is_some_and(|p| !p.comments.is_empty())).await;
    let comment = &view.post(&target).unwrap().comments[0];
    assert_eq!(comment.username, "ana");
    assert_eq!(comment.text, "lovely");
}

#[tokio::test]
async fn test_comment_on_missing_post_reports_failure() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    let mut events = client.subscribe_events();
    let result = client
        .add_comment(&PostId::new("gone"), "hello?")
        .unwrap()
        .wait()
        .await;
    assert!(matches!(result, Err(FeedError::NotFound(_))));
    assert!(matches!(events.recv().await.unwrap(), MutationEvent::Failed { .. }));
}

#[tokio::test]
async fn test_publish_post_appears_in_feed() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    client.start().await;
    wait_for(&client, |s| s.status == FeedStatus::Ready && s.profile.is_some()).await;

    let id = client
        .publish_post(NewPost {
            image_url: "media/moon.jpg".into(),
            description: "moonrise".into(),
        })
        .await
        .unwrap();

    let view = wait_for(&client, |s| s.post(&id).is_some()).await;
    assert_eq!(view.posts[0].id, id);
    let post = view.post(&id).unwrap();
    assert_eq!(post.username, "ana");
    assert_eq!(post.user_id, UserId::new("u1"));
    assert!(post.timestamp.is_some());
    assert!(post.liked_by.is_empty());
}

#[tokio::test]
async fn test_publish_without_media_rejected() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    let err = client
        .publish_post(NewPost {
            image_url: "  ".into(),
            description: "nothing".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Validation(_)));
}

#[tokio::test]
async fn test_publish_without_profile_uses_anonymous_name() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("ghost"));
    let id = client
        .publish_post(NewPost {
            image_url: "media/fog.jpg".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    assert_eq!(stored_post(&store, &id).await.username, "Anonymous");
}

// ============================================================================
// Tier 4: Identity
// ============================================================================

#[tokio::test]
async fn test_signed_out_can_view_but_not_mutate() {
    let store = seeded_store().await;
    let client = client_for(&store, None);
    client.start().await;
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(view.posts.len(), 2);
    assert!(view.profile.is_none());
    let target = view.posts[0].id.clone();

    assert_eq!(client.toggle_like(&target).unwrap_err(), FeedError::NotAuthenticated);
    assert_eq!(
        client.toggle_follow(&UserId::new("u2")).unwrap_err(),
        FeedError::NotAuthenticated
    );
    assert_eq!(
        client.add_comment(&target, "hi").unwrap_err(),
        FeedError::NotAuthenticated
    );
    assert!(stored_post(&store, &target).await.comments.is_empty());
    assert_eq!(client.view().posts, view.posts);
}

#[tokio::test]
async fn test_profile_load_failure_degrades() {
    let store = seeded_store().await;
    let client = client_for(&store, Some("u1"));
    store.fail_next_reads(1);
    client.start().await;

    let view = wait_for(&client, |s| s.status == FeedStatus::Ready).await;
    assert!(view.profile.is_none());
    assert!(!view.is_following(&UserId::new("u2")));
    assert_eq!(view.posts.len(), 2);
}

#[tokio::test]
async fn test_sign_out_clears_identity() {
    let store = seeded_store().await;
    let session = Arc::new(StaticSession::signed_in("u1"));
    let client = FeedClient::new(store.clone(), session.clone(), ClientConfig::default());
    client.start().await;
    let view = wait_for(&client, |s| s.status == FeedStatus::Ready && s.profile.is_some()).await;
    let liked = view.posts[0].id.clone();
    client.toggle_like(&liked).unwrap().wait().await.unwrap();

    session.sign_out();
    assert!(client.refresh_profile().await.is_none());

    let view = client.view();
    assert!(view.current_user_id.is_none());
    assert!(view.profile.is_none());
    assert!(!view.is_self(&UserId::new("u1")));
    assert!(!view.is_following(&UserId::new("u2")));
    assert!(view.posts.iter().all(|p| !view.is_liked(p)));
}
