//! Authentication backend for axum-login.
//!
//! Accounts live in the ledger; login is by email and the stored argon2 hash.

use axum_login::{AuthUser, AuthnBackend, UserId};
use std::sync::Arc;

use crate::domain::desk::TradingDesk;
use crate::domain::error::BolsaError;
use crate::domain::user::User;

/// The logged-in account as kept in the session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    /// Changing the password hash invalidates existing sessions.
    pw_hash_bytes: Vec<u8>,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            pw_hash_bytes: user.password_hash.into_bytes(),
        }
    }
}

impl AuthUser for SessionUser {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.pw_hash_bytes
    }
}

/// Login credentials submitted via the login form.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Backend {
    desk: Arc<TradingDesk>,
}

impl Backend {
    pub fn new(desk: Arc<TradingDesk>) -> Self {
        Self { desk }
    }
}

impl AuthnBackend for Backend {
    type User = SessionUser;
    type Credentials = Credentials;
    type Error = BolsaError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let desk = Arc::clone(&self.desk);
        // argon2 verification is CPU bound
        let user = tokio::task::spawn_blocking(move || {
            desk.authenticate(&creds.email, &creds.password)
        })
        .await
        .map_err(|e| BolsaError::Io(std::io::Error::other(e)))??;

        Ok(user.map(SessionUser::from))
    }

    async fn get_user(
        &self,
        user_id: &UserId<Self>,
    ) -> Result<Option<Self::User>, Self::Error> {
        match self.desk.user(*user_id) {
            Ok(user) => Ok(Some(user.into())),
            Err(BolsaError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
