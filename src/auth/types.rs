//! Session and auth payload types.

use crate::schema::Profile;
use crate::types::Row;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// The persisted authenticated identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token. Never validated.
    pub access_token: String,
    /// Snapshot of the account row at the time the session was last refreshed.
    pub user: Profile,
}

/// State transitions reported to the auth listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    UserUpdated,
}

impl AuthEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::UserUpdated => "USER_UPDATED",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ user, session }` payload of sign-in and sign-up.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthData {
    pub user: Option<Profile>,
    pub session: Option<Session>,
}

/// `{ user }` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub user: Option<Profile>,
}

/// `{ session }` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub session: Option<Session>,
}

/// Changes accepted by `update_user`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub email: Option<String>,
    /// Accepted for call-site compatibility; secrets are not stored.
    #[serde(default)]
    pub password: Option<String>,
    /// Shallow-merged into the profile's `metadata`.
    #[serde(default)]
    pub data: Option<Row>,
}

/// Account created by an administrator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email_confirm: bool,
    /// Stored as the profile's `metadata`; a `role` entry sets the account role.
    #[serde(default)]
    pub user_metadata: Option<Row>,
}

/// Auth state listener.
pub type AuthCallback = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

pub(crate) struct Registration {
    pub(crate) id: u64,
    pub(crate) callback: AuthCallback,
}

/// The single listener slot.
pub(crate) type ListenerSlot = Mutex<Option<Registration>>;

/// Handle returned by `on_auth_state_change`.
pub struct AuthSubscription {
    pub(crate) id: u64,
    pub(crate) slot: Weak<ListenerSlot>,
}

impl AuthSubscription {
    /// Whether this registration still occupies the listener slot.
    pub fn is_active(&self) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let active = slot.lock().as_ref().is_some_and(|r| r.id == self.id);
        active
    }

    /// Clear the slot if it still holds this registration.
    ///
    /// Returns `false` when a newer listener has replaced it; that listener
    /// stays registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let mut guard = slot.lock();
        if guard.as_ref().is_some_and(|r| r.id == self.id) {
            *guard = None;
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription").field("id", &self.id).finish()
    }
}
