//! Collection names, wire field names and configuration defaults.

/// Collection holding one document per post.
pub const POSTS: &str = "posts";

/// Collection holding one document per user, keyed by user id.
pub const USERS: &str = "users";

/// Wire (camelCase) field names used in queries and patches.
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LIKED_BY: &str = "likedBy";
    pub const COMMENTS: &str = "comments";
    pub const FOLLOWING: &str = "following";
    pub const FOLLOWERS: &str = "followers";
    pub const CREATED_AT: &str = "createdAt";
}

/// Broadcast capacity for mutation outcome events.
/// Slow observers lag and skip events rather than block mutations.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Shortest username accepted at registration (after trimming).
pub const DEFAULT_MIN_USERNAME_LEN: usize = 3;

/// Display name used when the author's profile is unavailable.
pub const DEFAULT_ANONYMOUS_NAME: &str = "Anonymous";
