//! User profile documents.
//!
//! The profile document lives at `users/{uid}` where `uid` is the
//! authenticated identity. Besides presentation fields it carries both halves
//! of the follow graph; the pair is only ever written together inside one
//! store transaction.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::IdSet;
use crate::ids::UserId;

/// Account visibility.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AccountVisibility {
    /// Anyone can see the account's posts.
    #[default]
    #[serde(alias = "OPENED")]
    #[strum(to_string = "OPEN", serialize = "OPENED")]
    Open,
    /// Only followers can see the account's posts.
    Closed,
}

/// A profile as stored in the `users` collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Document id (= authenticated identity). Filled from the document address.
    #[serde(skip)]
    pub id: UserId,
    /// Unique by product convention; not enforced here.
    pub username: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub account_type: AccountVisibility,
    /// Free-form role tag chosen at registration.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub following: IdSet<UserId>,
    #[serde(default)]
    pub followers: IdSet<UserId>,
    /// Unix ms.
    #[serde(default)]
    pub created_at: u64,
}

impl UserProfile {
    pub fn is_following(&self, user: &UserId) -> bool {
        self.following.contains(user)
    }

    pub fn is_followed_by(&self, user: &UserId) -> bool {
        self.followers.contains(user)
    }

    /// Set membership of `target` in `following`. Returns whether anything changed.
    pub fn set_following(&mut self, target: &UserId, desired: bool) -> bool {
        if desired {
            self.following.insert(target.clone())
        } else {
            self.following.shift_remove(target)
        }
    }
}

/// Registration input, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub username: String,
    pub bio: String,
    pub account_type: AccountVisibility,
    /// Avatar reference from the (external) upload step, if any.
    pub profile_image_url: Option<String>,
    pub phone_number: String,
    pub role: String,
}
