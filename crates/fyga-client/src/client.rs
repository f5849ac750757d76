//! Feed screen controller.
//!
//! [`FeedClient`] ties the pieces together for one feed view: it owns the
//! view state, the feed subscription, and the optimistic mutation engine,
//! and routes user intents to them.
//!
//! | Intent          | Local effect                   | Remote effect                      |
//! |-----------------|--------------------------------|------------------------------------|
//! | `select_tab`    | tab, status = Loading          | swap subscription                  |
//! | `toggle_like`   | flip membership (optimistic)   | like transaction, rollback on error |
//! | `toggle_follow` | flip `following` (optimistic)  | follow transaction, reload profile |
//! | `add_comment`   | none (arrives via the feed)    | array-union append                 |
//! | `publish_post`  | none (arrives via the feed)    | `add` with server timestamp        |

use std::sync::Arc;

use fyga_store::{DocumentStore, FieldPatch, to_fields};
use fyga_types::{Comment, FeedTab, NewPost, Post, PostId, UserId, UserProfile};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::constants::{POSTS, fields};
use crate::error::FeedError;
use crate::feed::FeedSubscriptionManager;
use crate::graph::SocialGraph;
use crate::optimistic::{Mutation, MutationEvent, MutationHandle, OptimisticEngine};
use crate::profile::ProfileCache;
use crate::session::Session;
use crate::state::StateCell;
use crate::view::{FeedStatus, FeedViewState};

struct ClientInner {
    store: Arc<dyn DocumentStore>,
    session: Arc<dyn Session>,
    config: ClientConfig,
    state: Arc<StateCell<FeedViewState>>,
    feeds: FeedSubscriptionManager,
    engine: OptimisticEngine,
    graph: SocialGraph,
    profiles: ProfileCache,
}

impl ClientInner {
    /// (Re)activate `tab` with the following set currently in view state.
    fn activate(&self, tab: FeedTab) -> u64 {
        let following = self
            .state
            .read(|s| s.profile.as_ref().map(|p| p.following.clone()));
        self.feeds.activate(tab, following.as_ref())
    }

    /// Reload identity and profile from the session.
    ///
    /// Reloads may overlap (one per follow toggle). Each takes a sequence
    /// number before reading; a reload that finishes after a newer one
    /// started is discarded. A signed-out session clears identity and profile.
    async fn reload_profile(&self) -> Option<UserProfile> {
        let seq = self.state.update(|s| {
            s.profile_generation += 1;
            s.profile_generation
        });
        let user = self.session.current_user_id();
        let profile = match &user {
            Some(user) => self.profiles.load_self(user).await,
            None => None,
        };

        let applied = self.state.update(|s| {
            if s.profile_generation != seq {
                return None;
            }
            s.current_user_id = user;
            s.profile = profile.clone();
            Some((s.tab, s.status != FeedStatus::Idle))
        });
        let Some((tab, opened)) = applied else {
            debug!(seq, "discarding superseded profile load");
            return self.state.read(|s| s.profile.clone());
        };
        // The Followed feed depends on the following set.
        if tab == FeedTab::Followed && opened {
            self.activate(tab);
        }
        profile
    }

    fn require_user(&self) -> Result<UserId, FeedError> {
        self.session
            .current_user_id()
            .ok_or(FeedError::NotAuthenticated)
    }

    fn author_name(&self) -> String {
        self.state
            .read(|s| s.profile.as_ref().map(|p| p.username.clone()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.profile.anonymous_name.clone())
    }
}

/// Controller for one feed view. Cheap to clone.
#[derive(Clone)]
pub struct FeedClient {
    inner: Arc<ClientInner>,
}

impl FeedClient {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: Arc<dyn Session>,
        config: ClientConfig,
    ) -> Self {
        let state = Arc::new(StateCell::new(FeedViewState {
            current_user_id: session.current_user_id(),
            ..Default::default()
        }));
        let inner = ClientInner {
            feeds: FeedSubscriptionManager::new(Arc::clone(&store), Arc::clone(&state)),
            engine: OptimisticEngine::new(config.feed.event_capacity),
            graph: SocialGraph::new(Arc::clone(&store)),
            profiles: ProfileCache::new(Arc::clone(&store)),
            store,
            session,
            config,
            state,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn state(&self) -> &Arc<StateCell<FeedViewState>> {
        &self.inner.state
    }

    /// Current view state (cloned).
    pub fn view(&self) -> FeedViewState {
        self.inner.state.get()
    }

    /// Outcomes of optimistic and reload-driven mutations.
    pub fn subscribe_events(&self) -> broadcast::Receiver<MutationEvent> {
        self.inner.engine.subscribe()
    }

    pub fn graph(&self) -> &SocialGraph {
        &self.inner.graph
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the Global feed, then load the signed-in user's profile.
    pub async fn start(&self) {
        let tab = self.inner.state.read(|s| s.tab);
        self.inner.activate(tab);
        self.inner.reload_profile().await;
    }

    /// Switch tabs. No-op when `tab` is already selected.
    pub fn select_tab(&self, tab: FeedTab) -> bool {
        let unchanged = self
            .inner
            .state
            .read(|s| s.tab == tab && s.status != FeedStatus::Idle);
        if unchanged {
            return false;
        }
        debug!(%tab, "tab selected");
        self.inner.activate(tab);
        true
    }

    /// Re-read the session and the profile (and the Followed feed, if
    /// selected). Clears both when the session has signed out.
    pub async fn refresh_profile(&self) -> Option<UserProfile> {
        self.inner.reload_profile().await
    }

    /// Re-open the current tab after a subscription failure.
    pub fn retry(&self) -> u64 {
        let tab = self.inner.state.read(|s| s.tab);
        self.inner.activate(tab)
    }

    /// Release the live subscription.
    pub fn deactivate(&self) {
        self.inner.feeds.deactivate();
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Optimistically flip the signed-in user's like on `post_id`.
    pub fn toggle_like(&self, post_id: &PostId) -> Result<MutationHandle, FeedError> {
        let user = self.inner.require_user()?;
        let graph = self.inner.graph.clone();
        let (local_post, remote_post) = (post_id.clone(), post_id.clone());
        let local_user = user.clone();

        Ok(self.inner.engine.apply(
            &self.inner.state,
            Mutation::LikeToggle {
                post_id: post_id.clone(),
            },
            move |s| {
                if let Some(post) = s.post_mut(&local_post) {
                    post.toggle_like(&local_user);
                }
            },
            async move { graph.toggle_like(&remote_post, &user).await.map(|_| ()) },
        ))
    }

    /// Optimistically follow or unfollow `target`, then reload the profile.
    pub fn toggle_follow(&self, target: &UserId) -> Result<MutationHandle, FeedError> {
        let me = self.inner.require_user()?;
        if &me == target {
            return Err(FeedError::Validation("a user cannot follow themselves".into()));
        }
        let following = self
            .inner
            .state
            .read(|s| s.profile.as_ref().map(|p| p.is_following(target)));
        let desired = match following {
            Some(following) => !following,
            None => return Err(FeedError::NotFound(format!("profile of {me} not loaded"))),
        };

        let graph = self.inner.graph.clone();
        let inner = Arc::clone(&self.inner);
        let (local_target, remote_target) = (target.clone(), target.clone());

        Ok(self.inner.engine.apply_then(
            &self.inner.state,
            Mutation::FollowToggle {
                target: target.clone(),
                desired,
            },
            move |s| {
                if let Some(profile) = s.profile.as_mut() {
                    profile.set_following(&local_target, desired);
                }
            },
            async move { graph.set_follow_state(&me, &remote_target, desired).await },
            async move {
                inner.reload_profile().await;
            },
        ))
    }

    /// Append a comment. Reload-driven: the comment appears with the next
    /// feed emission, never spliced in locally.
    pub fn add_comment(&self, post_id: &PostId, text: &str) -> Result<MutationHandle, FeedError> {
        self.inner.require_user()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::Validation("comment text is empty".into()));
        }
        let comment = Comment::new(self.inner.author_name(), text);
        let graph = self.inner.graph.clone();
        let post = post_id.clone();

        Ok(self.inner.engine.spawn_remote(
            Mutation::CommentAdd {
                post_id: post_id.clone(),
            },
            async move { graph.add_comment(&post, &comment).await },
        ))
    }

    /// Publish a post authored by the signed-in user. The post reaches the
    /// view through the feed subscription.
    pub async fn publish_post(&self, new_post: NewPost) -> Result<PostId, FeedError> {
        let user = self.inner.require_user()?;
        if new_post.image_url.trim().is_empty() {
            return Err(FeedError::Validation("a post needs a media reference".into()));
        }
        let profile_pic = self
            .inner
            .state
            .read(|s| s.profile.as_ref().map(|p| p.profile_image_url.clone()))
            .unwrap_or_default();

        let post = Post {
            user_id: user.clone(),
            username: self.inner.author_name(),
            profile_pic,
            image_url: new_post.image_url,
            description: new_post.description,
            ..Default::default()
        };
        let patch = FieldPatch::from_fields(to_fields(&post)?).server_timestamp(fields::TIMESTAMP);
        let id = PostId::new(self.inner.store.add(POSTS, patch).await?);
        info!(post_id = %id, user = %user, "post published");
        Ok(id)
    }
}
