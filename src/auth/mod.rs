//! Simulated authentication.
//!
//! One persisted session slot and one listener. Passwords are accepted and
//! ignored; the session's presence is the only authentication predicate.
//!
//! ```text
//! SignedOut --sign_in/sign_up--> SignedIn   (SIGNED_IN)
//! SignedIn  --sign_out-->        SignedOut  (SIGNED_OUT)
//! SignedIn  --update_user-->     SignedIn   (USER_UPDATED)
//! ```

mod client;
mod manager;
mod types;

pub use client::Auth;
pub use manager::SessionManager;
pub use types::{
    AuthCallback, AuthData, AuthEvent, AuthSubscription, NewUser, Session, SessionData,
    UserAttributes, UserData,
};
