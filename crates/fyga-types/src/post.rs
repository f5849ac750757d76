//! Post and comment documents.
//!
//! A [`Post`] is owned by its author and, within this workspace, is only ever
//! mutated by appending a [`Comment`] or toggling a like. Its id is assigned
//! by the store and never appears in the document body.

use serde::{Deserialize, Serialize};

use crate::IdSet;
use crate::ids::{PostId, UserId};

/// A comment embedded in a post.
///
/// Identity is the append position; comments are immutable once appended.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Author display name at the time of commenting.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
}

impl Comment {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

/// A post as stored in the `posts` collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Store-generated document id (filled from the document address).
    #[serde(skip)]
    pub id: PostId,
    /// Author. Required: a post without an author is malformed.
    pub user_id: UserId,
    /// Author display name.
    #[serde(default)]
    pub username: String,
    /// Author avatar reference.
    #[serde(default)]
    pub profile_pic: String,
    /// Media reference.
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    /// Append-only, unbounded.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Membership set of users who liked this post.
    #[serde(default)]
    pub liked_by: IdSet<UserId>,
    /// Server-assigned creation time (Unix ms). `None` until the store stamps it.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl Post {
    /// Whether `user` is in `likedBy`.
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.contains(user)
    }

    /// Flip `user`'s membership in `likedBy`, returning the new membership.
    pub fn toggle_like(&mut self, user: &UserId) -> bool {
        if self.liked_by.shift_remove(user) {
            false
        } else {
            self.liked_by.insert(user.clone());
            true
        }
    }

    /// Sort key for feeds: newest first, ties by id ascending.
    pub fn feed_order(a: &Post, b: &Post) -> std::cmp::Ordering {
        b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id))
    }
}

/// Input for publishing a post. Author fields are filled from the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPost {
    /// Media reference returned by the (external) upload step.
    pub image_url: String,
    pub description: String,
}
