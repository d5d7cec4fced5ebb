//! Users, registration rules and credential hashing.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use super::error::BolsaError;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// PHC-format argon2 hash, never the plaintext password.
    pub password_hash: String,
    /// Cash balance in the home currency.
    pub cash_balance: f64,
}

/// A validated registration ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub cash_balance: f64,
}

/// Raw registration form input.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

pub const USERNAME_MIN_LEN: usize = 4;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;

impl Registration {
    /// Check the form fields. Uniqueness is checked against the store separately.
    pub fn validate(&self) -> Result<(), BolsaError> {
        let username_len = self.username.trim().chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
            return Err(BolsaError::Registration {
                reason: format!(
                    "username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
                ),
            });
        }
        if !is_plausible_email(self.email.trim()) {
            return Err(BolsaError::Registration {
                reason: "email address is not valid".to_string(),
            });
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(BolsaError::Registration {
                reason: format!("password must be at least {PASSWORD_MIN_LEN} characters"),
            });
        }
        if self.password != self.confirm_password {
            return Err(BolsaError::Registration {
                reason: "passwords do not match".to_string(),
            });
        }
        Ok(())
    }

    /// Validate and hash, producing the record to insert.
    pub fn into_new_user(self, starting_cash: f64) -> Result<NewUser, BolsaError> {
        self.validate()?;
        let password_hash = hash_password(&self.password)?;
        Ok(NewUser {
            username: self.username.trim().to_string(),
            email: normalize_email(&self.email),
            password_hash,
            cash_balance: starting_cash,
        })
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

fn argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, BolsaError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| BolsaError::Registration {
            reason: format!("could not hash password: {e}"),
        })
}

/// Constant-time check of a password against a stored PHC hash.
/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = match PasswordHash::new(password_hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    argon2()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
