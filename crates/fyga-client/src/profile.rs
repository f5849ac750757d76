//! Profile/identity cache and profile registration.

use std::sync::Arc;

use fyga_store::{DocumentStore, to_fields};
use fyga_types::{ProfileDraft, UserId, UserProfile, now_millis};
use tracing::{debug, info, warn};

use crate::config::ProfileSection;
use crate::error::FeedError;
use crate::graph::user_ref;

/// Read one profile. Malformed documents read as absent.
pub async fn fetch_profile(
    store: &dyn DocumentStore,
    user: &UserId,
) -> Result<Option<UserProfile>, FeedError> {
    let Some(doc) = store.get(&user_ref(user)).await? else {
        return Ok(None);
    };
    match doc.decode::<UserProfile>() {
        Ok(mut profile) => {
            profile.id = user.clone();
            Ok(Some(profile))
        }
        Err(e) => {
            warn!(user = %user, error = %e, "malformed profile document");
            Ok(None)
        }
    }
}

/// Loader for the signed-in user's profile. Stateless: the view state that
/// receives the result is the only copy.
pub struct ProfileCache {
    store: Arc<dyn DocumentStore>,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load `user`'s profile.
    ///
    /// Failure is non-fatal: it is logged and reads as absent, so features
    /// that depend on the profile degrade instead of erroring.
    pub async fn load_self(&self, user: &UserId) -> Option<UserProfile> {
        match fetch_profile(self.store.as_ref(), user).await {
            Ok(profile) => {
                debug!(user = %user, found = profile.is_some(), "profile loaded");
                profile
            }
            Err(e) => {
                warn!(user = %user, error = %e, "failed to load profile");
                None
            }
        }
    }
}

/// Create the profile document for a freshly authenticated user.
///
/// Username and bio are trimmed; usernames shorter than
/// `config.min_username_len` characters are rejected.
pub async fn register_profile(
    store: &dyn DocumentStore,
    config: &ProfileSection,
    user: &UserId,
    draft: ProfileDraft,
) -> Result<UserProfile, FeedError> {
    let username = draft.username.trim().to_string();
    if username.chars().count() < config.min_username_len {
        return Err(FeedError::Validation(format!(
            "username must be at least {} characters",
            config.min_username_len
        )));
    }

    let profile = UserProfile {
        id: user.clone(),
        username,
        phone_number: draft.phone_number,
        bio: draft.bio.trim().to_string(),
        profile_image_url: draft.profile_image_url.unwrap_or_default(),
        account_type: draft.account_type,
        role: draft.role,
        created_at: now_millis(),
        ..Default::default()
    };
    store.set(&user_ref(user), to_fields(&profile)?).await?;
    info!(user = %user, username = %profile.username, "profile registered");
    Ok(profile)
}
