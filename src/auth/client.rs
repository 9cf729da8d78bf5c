//! Auth facade over a [`Database`].

use super::types::{
    AuthData, AuthEvent, AuthSubscription, NewUser, Session, SessionData, UserAttributes, UserData,
};
use crate::database::Database;
use crate::error::ApiError;
use crate::schema::{decode_row, encode_row, AppRole, KnownTable, Profile};
use crate::types::{ChangeEvent, Response, Row, Timestamp};
use serde_json::Value;
use tracing::{error, info};

/// Sign-in, sign-up and session access for one database.
///
/// Obtained from [`Database::auth`]. Every method returns a
/// [`Response`] envelope; failures never panic.
pub struct Auth<'a> {
    db: &'a Database,
}

impl<'a> Auth<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Sign in as the account registered under `email`.
    ///
    /// The password is accepted but not checked.
    pub fn sign_in(&self, email: &str, _password: &str) -> Response<AuthData> {
        let profiles = self.db.tables().snapshot(KnownTable::Profiles.name());
        let Some(row) = find_by_email(&profiles, email) else {
            return Response::failure(ApiError::not_found("Invalid login credentials"));
        };
        let user = match decode_profile(row.clone()) {
            Ok(user) => user,
            Err(e) => return Response::failure(e),
        };

        let session = Session {
            access_token: self.db.sessions().issue_token(&user.subject()),
            user,
        };
        if let Err(e) = self.db.sessions().store(&session) {
            return Response::failure(e.into());
        }
        info!(user = %session.user.subject(), "signed in");
        self.db.sessions().notify(AuthEvent::SignedIn, Some(&session));

        Response::ok(
            Some(AuthData {
                user: Some(session.user.clone()),
                session: Some(session),
            }),
            200,
        )
    }

    /// Register a new account and sign in as it.
    pub fn sign_up(&self, email: &str, _password: &str) -> Response<AuthData> {
        let user = match self.create_account(email, AppRole::User, None, "User already registered") {
            Ok(user) => user,
            Err(e) => return Response::failure(e),
        };

        let session = Session {
            access_token: self.db.sessions().issue_token(&user.subject()),
            user: user.clone(),
        };
        if let Err(e) = self.db.sessions().store(&session) {
            return Response::failure(e.into());
        }
        info!(user = %user.subject(), "signed up");
        self.db.sessions().notify(AuthEvent::SignedIn, Some(&session));

        Response::ok(
            Some(AuthData {
                user: Some(user),
                session: Some(session),
            }),
            200,
        )
    }

    /// Clear the session. Succeeds when already signed out.
    pub fn sign_out(&self) -> Response<()> {
        if let Err(e) = self.db.sessions().clear() {
            return Response::failure(e.into());
        }
        info!("signed out");
        self.db.sessions().notify(AuthEvent::SignedOut, None);
        Response::ok(None, 204)
    }

    pub fn get_session(&self) -> Response<SessionData> {
        Response::ok(
            Some(SessionData {
                session: self.db.sessions().current(),
            }),
            200,
        )
    }

    pub fn get_user(&self) -> Response<UserData> {
        Response::ok(
            Some(UserData {
                user: self.db.sessions().current().map(|s| s.user),
            }),
            200,
        )
    }

    /// Apply `changes` to the signed-in account.
    pub fn update_user(&self, changes: UserAttributes) -> Response<UserData> {
        let Some(session) = self.db.sessions().current() else {
            return Response::failure(ApiError::unauthorized("Not logged in"));
        };

        let table = KnownTable::Profiles.name();
        let tables = self.db.tables();
        let lock = self.db.write_lock();

        let mut rows = tables.snapshot(table);
        let Some(index) = rows
            .iter()
            .position(|r| r.get("id") == Some(&session.user.id))
        else {
            return Response::failure(ApiError::not_found("User not found"));
        };

        if let Some(email) = changes.email.as_deref().filter(|e| !e.is_empty()) {
            let taken = rows
                .iter()
                .enumerate()
                .any(|(i, r)| i != index && r.get("email").and_then(Value::as_str) == Some(email));
            if taken {
                return Response::failure(ApiError::conflict(
                    "A user with this email address has already been registered",
                ));
            }
            rows[index].insert("email".to_string(), Value::String(email.to_string()));
        }
        if let Some(data) = changes.data {
            let mut metadata = match rows[index].remove("metadata") {
                Some(Value::Object(existing)) => existing,
                _ => Row::new(),
            };
            metadata.extend(data);
            rows[index].insert("metadata".to_string(), Value::Object(metadata));
        }
        rows[index].insert(
            "updated_at".to_string(),
            Value::String(Timestamp::now().to_iso()),
        );

        let updated_row = rows[index].clone();
        let user = match decode_profile(updated_row.clone()) {
            Ok(user) => user,
            Err(e) => return Response::failure(e),
        };
        if let Err(e) = tables.replace(table, rows) {
            error!(table, error = %e, "failed to persist user update");
            return Response::failure(e.into());
        }
        drop(lock);

        self.db
            .events()
            .publish(ChangeEvent::update(table, None, updated_row));

        let session = Session {
            user: user.clone(),
            ..session
        };
        if let Err(e) = self.db.sessions().store(&session) {
            return Response::failure(e.into());
        }
        self.db
            .sessions()
            .notify(AuthEvent::UserUpdated, Some(&session));

        Response::ok(Some(UserData { user: Some(user) }), 200)
    }

    /// Register the only auth listener, replacing any earlier one.
    pub fn on_auth_state_change<F>(&self, callback: F) -> AuthSubscription
    where
        F: Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    {
        self.db.sessions().on_change(callback)
    }

    /// Create an account without signing in as it.
    pub fn admin_create_user(&self, new_user: NewUser) -> Response<UserData> {
        let metadata = new_user.user_metadata.unwrap_or_default();
        let role = match metadata.get("role") {
            None | Some(Value::Null) => AppRole::User,
            Some(value) => match serde_json::from_value::<AppRole>(value.clone()) {
                Ok(role) => role,
                Err(_) => {
                    return Response::failure(
                        ApiError::invalid_input("Unknown role").with_details(value.to_string()),
                    )
                }
            },
        };

        match self.create_account(&new_user.email, role, Some(metadata), "User already exists") {
            Ok(user) => {
                info!(user = %user.subject(), role = role.as_str(), "account created by admin");
                Response::ok(Some(UserData { user: Some(user) }), 200)
            }
            Err(e) => Response::failure(e),
        }
    }

    /// Insert a profile and its role row, then announce both.
    fn create_account(
        &self,
        email: &str,
        role: AppRole,
        metadata: Option<Row>,
        duplicate_message: &str,
    ) -> Result<Profile, ApiError> {
        if email.is_empty() {
            return Err(ApiError::invalid_input("Email must not be empty"));
        }

        let sessions = self.db.sessions();
        let tables = self.db.tables();
        let profiles_table = KnownTable::Profiles.name();
        let roles_table = KnownTable::UserRoles.name();

        let lock = self.db.write_lock();
        let mut profiles = tables.snapshot(profiles_table);
        if find_by_email(&profiles, email).is_some() {
            return Err(ApiError::conflict(duplicate_message));
        }

        let now = Timestamp::now().to_iso();
        let mut user = Profile::new(sessions.next_identifier("user"), email, now.clone());
        user.role = role;
        user.metadata = metadata;
        let profile_row = encode_row(&user)?;

        let mut role_row = Row::new();
        role_row.insert("id".into(), Value::String(sessions.next_identifier("role")));
        role_row.insert("user_id".into(), user.id.clone());
        role_row.insert("role".into(), Value::String(role.as_str().to_string()));
        role_row.insert("created_at".into(), Value::String(now));

        let mut roles = tables.snapshot(roles_table);
        profiles.push(profile_row.clone());
        roles.push(role_row.clone());

        if let Err(e) = tables.replace_all(vec![
            (profiles_table.to_string(), profiles),
            (roles_table.to_string(), roles),
        ]) {
            error!(error = %e, "failed to persist new account");
            return Err(e.into());
        }
        drop(lock);

        let events = self.db.events();
        events.publish(ChangeEvent::insert(profiles_table, profile_row));
        events.publish(ChangeEvent::insert(roles_table, role_row));

        Ok(user)
    }
}

fn find_by_email<'r>(rows: &'r [Row], email: &str) -> Option<&'r Row> {
    rows.iter()
        .find(|r| r.get("email").and_then(Value::as_str) == Some(email))
}

fn decode_profile(row: Row) -> Result<Profile, ApiError> {
    decode_row(row).map_err(|e| {
        ApiError::internal("Malformed profile row").with_details(e.to_string())
    })
}
