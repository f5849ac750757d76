//! Feed view state.
//!
//! Process-local and derived: the ordered posts of the active tab plus the
//! identity context needed to render them. Never persisted.

use fyga_types::{FeedTab, Post, PostId, UserId, UserProfile};

use crate::optimistic::{MutationScope, Optimistic};

/// Load status of the active feed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FeedStatus {
    /// No feed active.
    #[default]
    Idle,
    /// Subscription attached, first snapshot not yet delivered.
    Loading,
    Ready,
    /// Terminal for the subscription; `retry()` starts a new one.
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedViewState {
    /// Newest first; replaced wholesale on every emission.
    pub posts: Vec<Post>,
    pub tab: FeedTab,
    pub status: FeedStatus,
    pub error_message: Option<String>,
    pub current_user_id: Option<UserId>,
    /// Signed-in user's profile; `None` until loaded (or when loading failed).
    pub profile: Option<UserProfile>,
    /// Bumped on every (re)activation; emissions from older generations are
    /// discarded.
    pub generation: u64,
    /// Bumped when a profile reload starts; only the newest reload may write
    /// `profile`.
    pub profile_generation: u64,
}

impl FeedViewState {
    pub fn is_loading(&self) -> bool {
        self.status == FeedStatus::Loading
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|p| &p.id == id)
    }

    pub fn post_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| &p.id == id)
    }

    /// Whether the signed-in user likes `post`. False when signed out.
    pub fn is_liked(&self, post: &Post) -> bool {
        self.current_user_id
            .as_ref()
            .is_some_and(|me| post.is_liked_by(me))
    }

    /// Whether the signed-in user follows `user`. False while the profile is unknown.
    pub fn is_following(&self, user: &UserId) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_following(user))
    }

    pub fn is_self(&self, user: &UserId) -> bool {
        self.current_user_id.as_ref() == Some(user)
    }
}

/// Captured slice of a view state.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewSlice {
    Posts(Vec<Post>),
    Profile(Option<UserProfile>),
}

impl Optimistic for FeedViewState {
    type Snapshot = ViewSlice;

    fn capture(&self, scope: MutationScope) -> ViewSlice {
        match scope {
            MutationScope::Posts => ViewSlice::Posts(self.posts.clone()),
            MutationScope::Profile => ViewSlice::Profile(self.profile.clone()),
        }
    }

    fn restore(&mut self, snapshot: ViewSlice) {
        match snapshot {
            ViewSlice::Posts(posts) => self.posts = posts,
            ViewSlice::Profile(profile) => self.profile = profile,
        }
    }
}
