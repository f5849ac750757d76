//! Identity boundary.
//!
//! Credential verification lives outside the core; all the core needs is the
//! id of the signed-in user, if any.

use fyga_types::UserId;
use parking_lot::RwLock;

/// Source of the current user's identity.
pub trait Session: Send + Sync {
    /// `None` when nobody is signed in. Viewing is allowed; mutations are not.
    fn current_user_id(&self) -> Option<UserId>;
}

/// A session whose user is set explicitly (tests, the simulator, embedding
/// hosts that manage sign-in themselves).
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<UserId>>,
}

impl StaticSession {
    pub fn signed_in(user: impl Into<UserId>) -> Self {
        Self {
            user: RwLock::new(Some(user.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *self.user.write() = Some(user.into());
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl Session for StaticSession {
    fn current_user_id(&self) -> Option<UserId> {
        self.user.read().clone()
    }
}
