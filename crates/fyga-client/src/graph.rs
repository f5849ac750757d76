//! Social graph transactions.
//!
//! The follow graph is stored twice: `a.following` and `b.followers`. Both
//! sides change in one store transaction so the invariant
//! `a ∈ b.followers ⇔ b ∈ a.following` holds after every successful call.
//! Likes are a read-then-write on `likedBy`, also transactional, so racing
//! toggles by different users both land (the store retries the loser).
//!
//! Nothing here touches local view state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fyga_store::{DocRef, Document, DocumentStore, FieldOp, FieldPatch, StoreError, Write};
use fyga_types::{Comment, Post, PostId, UserId};
use serde_json::Value;
use tracing::{debug, info};

use crate::constants::{POSTS, USERS, fields};
use crate::error::FeedError;

pub fn user_ref(user: &UserId) -> DocRef {
    DocRef::new(USERS, user.as_str())
}

pub fn post_ref(post: &PostId) -> DocRef {
    DocRef::new(POSTS, post.as_str())
}

#[derive(Clone)]
pub struct SocialGraph {
    store: Arc<dyn DocumentStore>,
}

impl SocialGraph {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Make `actor` follow (`desired = true`) or unfollow `target`.
    ///
    /// Idempotent. Fails with `NotFound` if either profile document is
    /// missing and `Validation` for a self-follow.
    pub async fn set_follow_state(
        &self,
        actor: &UserId,
        target: &UserId,
        desired: bool,
    ) -> Result<(), FeedError> {
        if actor == target {
            return Err(FeedError::Validation("a user cannot follow themselves".into()));
        }
        let actor_doc = user_ref(actor);
        let target_doc = user_ref(target);
        let reads = vec![actor_doc.clone(), target_doc.clone()];
        let (actor_id, target_id) = (actor.to_string(), target.to_string());

        self.store
            .transaction(
                reads,
                Box::new(move |docs: &[Option<Document>]| {
                    for (doc, addr) in docs.iter().zip([&actor_doc, &target_doc]) {
                        if doc.is_none() {
                            return Err(StoreError::NotFound(addr.to_string()));
                        }
                    }
                    let op = |value: &str| {
                        let values = vec![Value::from(value)];
                        if desired {
                            FieldOp::ArrayUnion(values)
                        } else {
                            FieldOp::ArrayRemove(values)
                        }
                    };
                    Ok(vec![
                        Write::update(
                            actor_doc.clone(),
                            FieldPatch::new().op(fields::FOLLOWING, op(&target_id)),
                        ),
                        Write::update(
                            target_doc.clone(),
                            FieldPatch::new().op(fields::FOLLOWERS, op(&actor_id)),
                        ),
                    ])
                }),
            )
            .await?;

        info!(actor = %actor, target = %target, desired, "follow state updated");
        Ok(())
    }

    pub async fn follow(&self, actor: &UserId, target: &UserId) -> Result<(), FeedError> {
        self.set_follow_state(actor, target, true).await
    }

    pub async fn unfollow(&self, actor: &UserId, target: &UserId) -> Result<(), FeedError> {
        self.set_follow_state(actor, target, false).await
    }

    /// Flip `user`'s membership in the post's `likedBy`. Returns the new
    /// membership as committed.
    pub async fn toggle_like(&self, post: &PostId, user: &UserId) -> Result<bool, FeedError> {
        let doc = post_ref(post);
        let liked = Arc::new(AtomicBool::new(false));
        let outcome = Arc::clone(&liked);
        let user_id = user.clone();
        let target = doc.clone();

        self.store
            .transaction(
                vec![doc],
                Box::new(move |docs: &[Option<Document>]| {
                    let Some(Some(current)) = docs.first() else {
                        return Err(StoreError::NotFound(target.to_string()));
                    };
                    let post: Post = current.decode()?;
                    let value = vec![Value::from(user_id.as_str())];
                    let (op, now_liked) = if post.is_liked_by(&user_id) {
                        (FieldOp::ArrayRemove(value), false)
                    } else {
                        (FieldOp::ArrayUnion(value), true)
                    };
                    // Last attempt wins; only the committed attempt's value survives.
                    outcome.store(now_liked, Ordering::SeqCst);
                    Ok(vec![Write::update(
                        target.clone(),
                        FieldPatch::new().op(fields::LIKED_BY, op),
                    )])
                }),
            )
            .await?;

        let liked = liked.load(Ordering::SeqCst);
        debug!(post_id = %post, user = %user, liked, "like toggled");
        Ok(liked)
    }

    /// Append a comment. Not transactional: a single array-union update.
    pub async fn add_comment(&self, post: &PostId, comment: &Comment) -> Result<(), FeedError> {
        let value = serde_json::to_value(comment).map_err(StoreError::from)?;
        self.store
            .update(
                &post_ref(post),
                FieldPatch::new().op(fields::COMMENTS, FieldOp::ArrayUnion(vec![value])),
            )
            .await?;
        debug!(post_id = %post, "comment added");
        Ok(())
    }
}
