//! Persisted session slot and the single auth listener.

use super::types::{AuthCallback, AuthEvent, AuthSubscription, ListenerSlot, Registration, Session};
use crate::error::Result;
use crate::schema::Profile;
use crate::storage::KeyValueStorage;
use crate::types::Timestamp;
use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the one persisted session and the one registered listener.
pub struct SessionManager {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    listener: Arc<ListenerSlot>,
    next_listener: AtomicU64,
    /// Last value handed out by `next_identifier`.
    last_identifier: AtomicI64,
    tokens_issued: AtomicU64,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            listener: Arc::new(ListenerSlot::default()),
            next_listener: AtomicU64::new(1),
            last_identifier: AtomicI64::new(0),
            tokens_issued: AtomicU64::new(0),
        }
    }

    /// Storage key of the session slot.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted session. A malformed entry reads as signed out.
    pub fn current(&self) -> Option<Session> {
        let raw = match self.storage.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read session, treating as signed out");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "malformed session entry, treating as signed out");
                None
            }
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    pub fn store(&self, session: &Session) -> Result<()> {
        let encoded = serde_json::to_string(session)?;
        self.storage.set(&self.key, &encoded)?;
        debug!(user = %session.user.subject(), "session stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(&self.key)
    }

    /// Replace the snapshot of `profile` in the session if it is the session subject.
    ///
    /// Returns the refreshed session, or `None` when nobody or somebody else
    /// is signed in.
    pub fn refresh_subject(&self, profile: &Profile) -> Result<Option<Session>> {
        let Some(mut session) = self.current() else {
            return Ok(None);
        };
        if session.user.id != profile.id {
            return Ok(None);
        }
        session.user = profile.clone();
        self.store(&session)?;
        Ok(Some(session))
    }

    /// Install `callback` as the only listener, replacing any previous one.
    pub fn on_change<F>(&self, callback: F) -> AuthSubscription
    where
        F: Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let callback: AuthCallback = Arc::new(callback);
        let previous = self.listener.lock().replace(Registration { id, callback });
        if previous.is_some() {
            debug!(listener = id, "auth listener replaced");
        }
        AuthSubscription {
            id,
            slot: Arc::downgrade(&self.listener),
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Invoke the registered listener, if any. Returns whether it ran to completion.
    pub fn notify(&self, event: AuthEvent, session: Option<&Session>) -> bool {
        let Some(callback) = self.listener.lock().as_ref().map(|r| Arc::clone(&r.callback)) else {
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| callback(event, session))) {
            Ok(()) => true,
            Err(_) => {
                warn!(event = %event, "auth listener panicked");
                false
            }
        }
    }

    /// Mint an opaque token for `subject`.
    pub fn issue_token(&self, subject: &str) -> String {
        let serial = self.tokens_issued.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(subject.as_bytes());
        hasher.update(Timestamp::now().0.to_le_bytes());
        hasher.update(serial.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Time-based identifier such as `user-1718000000000`, strictly
    /// increasing within this process.
    pub fn next_identifier(&self, prefix: &str) -> String {
        let now = Timestamp::now().0;
        let previous = self
            .last_identifier
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        format!("{}-{}", prefix, now.max(previous + 1))
    }
}
