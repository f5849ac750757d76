//! Shared identity and document types for fyga.
//!
//! This crate is the leaf of the workspace: typed IDs, the post and profile
//! documents as they live in the store, and the feed tab vocabulary. It has
//! **no internal fyga dependencies**.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! UserProfile (UserId) ← users/{uid}, id = authenticated identity
//!     └── following: set of UserId
//!     └── followers: set of UserId   (a ∈ b.followers ⇔ b ∈ a.following)
//!     └── authors Post
//!
//! Post (PostId) ← posts/{store-generated id}
//!     └── likedBy: set of UserId
//!     └── comments: append-only list of Comment (embedded)
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`UserId`]        | Who (equals the authenticated identity)      |
//! | [`PostId`]        | Store-generated post document id             |
//! | [`Post`]          | Post document (media, text, likes, comments) |
//! | [`Comment`]       | Embedded comment (author name + text)        |
//! | [`UserProfile`]   | Profile document including the follow graph  |
//! | [`FeedTab`]       | Which feed is shown (global / followed)      |
//! |-------------------|----------------------------------------------|

pub mod feed;
pub mod ids;
pub mod post;
pub mod profile;

// Re-export primary types at crate root for convenience.
pub use feed::FeedTab;
pub use ids::{PostId, UserId};
pub use post::{Comment, NewPost, Post};
pub use profile::{AccountVisibility, ProfileDraft, UserProfile};

/// Membership set used for `likedBy`, `following` and `followers`.
///
/// Insertion ordered so documents round-trip in the order the store wrote
/// them; equality ignores order.
pub type IdSet<T> = indexmap::IndexSet<T>;

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
