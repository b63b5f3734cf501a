//! The authentication-check capability.
//!
//! Keel does not implement credential storage itself — the server is
//! handed something that implements [`Authenticator`] and calls it when a
//! login frame arrives. Production deployments back it with a database;
//! tests and demos use [`MemoryAuthenticator`].

use std::collections::HashMap;

use crate::{Credentials, PlayerId, SessionError};

/// Validates submitted credentials and returns the player's identity.
///
/// `Send + Sync + 'static` because the check is awaited from room actor
/// tasks and lives as long as the server. The check is a suspend point:
/// implementations may await a database or token service, but must not
/// block the thread.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given credentials.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthFailed`] when the credentials are not
    /// recognized, and [`SessionError::Unavailable`] when the backing
    /// store cannot be reached (the two are handled differently by
    /// retry policy).
    fn check(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}

/// An in-memory [`Authenticator`] over a fixed user table.
///
/// Intended for tests and local development — credentials are compared in
/// plain text and never persisted.
#[derive(Debug, Default)]
pub struct MemoryAuthenticator {
    users: HashMap<String, (String, PlayerId)>,
}

impl MemoryAuthenticator {
    /// Creates an empty authenticator that rejects everyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user. Replaces any existing entry with the same name.
    pub fn with_user(
        mut self,
        username: &str,
        password: &str,
        player_id: PlayerId,
    ) -> Self {
        self.users.insert(
            username.to_string(),
            (password.to_string(), player_id),
        );
        self
    }
}

impl Authenticator for MemoryAuthenticator {
    async fn check(
        &self,
        credentials: &Credentials,
    ) -> Result<PlayerId, SessionError> {
        match self.users.get(&credentials.username) {
            Some((password, player_id))
                if *password == credentials.password =>
            {
                Ok(*player_id)
            }
            Some(_) => {
                tracing::debug!(
                    username = %credentials.username,
                    "rejected login: wrong password"
                );
                Err(SessionError::AuthFailed)
            }
            None => {
                tracing::debug!(
                    username = %credentials.username,
                    "rejected login: unknown user"
                );
                Err(SessionError::AuthFailed)
            }
        }
    }
}
