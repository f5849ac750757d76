//! Profile screen controller.
//!
//! Shows the signed-in user's profile and their own posts. Unlike the feed,
//! this screen has no live listener: posts are fetched once, likes are
//! optimistic, and a new comment triggers a coarse reload of the whole list.

use std::sync::Arc;

use fyga_store::DocumentStore;
use fyga_types::{Comment, Post, PostId, UserId, UserProfile};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::FeedError;
use crate::feed::load_user_posts;
use crate::graph::SocialGraph;
use crate::optimistic::{
    Mutation, MutationEvent, MutationHandle, MutationScope, Optimistic, OptimisticEngine,
};
use crate::profile::fetch_profile;
use crate::session::Session;
use crate::state::StateCell;
use crate::view::ViewSlice;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileViewState {
    pub is_loading: bool,
    pub user: Option<UserProfile>,
    /// The user's own posts, newest first.
    pub posts: Vec<Post>,
    pub current_user_id: Option<UserId>,
    pub error_message: Option<String>,
}

impl Optimistic for ProfileViewState {
    type Snapshot = ViewSlice;

    fn capture(&self, scope: MutationScope) -> ViewSlice {
        match scope {
            MutationScope::Posts => ViewSlice::Posts(self.posts.clone()),
            MutationScope::Profile => ViewSlice::Profile(self.user.clone()),
        }
    }

    fn restore(&mut self, snapshot: ViewSlice) {
        match snapshot {
            ViewSlice::Posts(posts) => self.posts = posts,
            ViewSlice::Profile(user) => self.user = user,
        }
    }
}

pub struct ProfileController {
    store: Arc<dyn DocumentStore>,
    session: Arc<dyn Session>,
    config: ClientConfig,
    state: Arc<StateCell<ProfileViewState>>,
    engine: OptimisticEngine,
    graph: SocialGraph,
}

impl ProfileController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: Arc<dyn Session>,
        config: ClientConfig,
    ) -> Self {
        Self {
            engine: OptimisticEngine::new(config.feed.event_capacity),
            graph: SocialGraph::new(Arc::clone(&store)),
            state: Arc::new(StateCell::new(ProfileViewState::default())),
            store,
            session,
            config,
        }
    }

    pub fn state(&self) -> &Arc<StateCell<ProfileViewState>> {
        &self.state
    }

    pub fn view(&self) -> ProfileViewState {
        self.state.get()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MutationEvent> {
        self.engine.subscribe()
    }

    /// Fetch the profile and the user's posts.
    pub async fn load(&self) {
        self.state.update(|s| s.is_loading = true);
        let Some(user) = self.session.current_user_id() else {
            self.state.update(|s| {
                s.is_loading = false;
                s.error_message = Some(FeedError::NotAuthenticated.to_string());
            });
            return;
        };
        self.state.update(|s| s.current_user_id = Some(user.clone()));

        let loaded = async {
            let profile = fetch_profile(self.store.as_ref(), &user).await?;
            let posts = load_user_posts(self.store.as_ref(), &user).await?;
            Ok::<_, FeedError>((profile, posts))
        }
        .await;

        match loaded {
            Ok((profile, posts)) => {
                debug!(user = %user, posts = posts.len(), "profile screen loaded");
                self.state.update(|s| {
                    s.is_loading = false;
                    s.user = profile;
                    s.posts = posts;
                    s.error_message = None;
                });
            }
            Err(e) => {
                warn!(user = %user, error = %e, "failed to load profile screen");
                self.state.update(|s| {
                    s.is_loading = false;
                    s.error_message = Some(format!("failed to load profile and posts: {e}"));
                });
            }
        }
    }

    pub fn toggle_like(&self, post_id: &PostId) -> Result<MutationHandle, FeedError> {
        let user = self
            .session
            .current_user_id()
            .ok_or(FeedError::NotAuthenticated)?;
        let graph = self.graph.clone();
        let (local_post, remote_post) = (post_id.clone(), post_id.clone());
        let local_user = user.clone();

        Ok(self.engine.apply(
            &self.state,
            Mutation::LikeToggle {
                post_id: post_id.clone(),
            },
            move |s| {
                if let Some(post) = s.posts.iter_mut().find(|p| p.id == local_post) {
                    post.toggle_like(&local_user);
                }
            },
            async move { graph.toggle_like(&remote_post, &user).await.map(|_| ()) },
        ))
    }

    /// Append a comment, then reload the whole post list.
    pub fn add_comment(&self, post_id: &PostId, text: &str) -> Result<MutationHandle, FeedError> {
        let user = self
            .session
            .current_user_id()
            .ok_or(FeedError::NotAuthenticated)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::Validation("comment text is empty".into()));
        }
        let username = self
            .state
            .read(|s| s.user.as_ref().map(|u| u.username.clone()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.profile.anonymous_name.clone());
        let comment = Comment::new(username, text);

        let graph = self.graph.clone();
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let post = post_id.clone();

        Ok(self.engine.spawn_remote(
            Mutation::CommentAdd {
                post_id: post_id.clone(),
            },
            async move {
                graph.add_comment(&post, &comment).await?;
                match load_user_posts(store.as_ref(), &user).await {
                    Ok(posts) => state.update(|s| s.posts = posts),
                    Err(e) => warn!(user = %user, error = %e, "post reload after comment failed"),
                }
                Ok::<(), FeedError>(())
            },
        ))
    }
}
