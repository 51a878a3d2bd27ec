use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use tower_sessions::Session;

use crate::db::DatabasePool;
use crate::error::AppError;
use crate::models::{User, UserId};
use crate::validation::{require, LoginForm, RegisterForm};

/// Session key holding the authenticated user's id.
pub const USER_ID_KEY: &str = "user_id";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Create a user with a hashed password and the configured starting cash.
pub async fn register(
    pool: &DatabasePool,
    starting_cash: Decimal,
    form: &RegisterForm,
) -> Result<User, AppError> {
    let username = require(form.username.as_deref(), "username")?;
    let password = form
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or(AppError::MissingField("password"))?;
    if form.confirmation.as_deref() != Some(password) {
        return Err(AppError::PasswordMismatch);
    }

    let hash = hash_password(password)?;
    let user = pool
        .transaction(|repo| repo.insert_user(username, &hash, starting_cash))
        .await
        .map_err(AppError::from)?;

    tracing::info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

/// Check credentials. Unknown usernames and wrong passwords fail the same way.
pub async fn login(pool: &DatabasePool, form: &LoginForm) -> Result<User, AppError> {
    let username = require(form.username.as_deref(), "username")?;
    let password = form
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or(AppError::MissingField("password"))?;

    let user = pool
        .transaction(|repo| repo.find_user(username))
        .await
        .map_err(AppError::from)?;

    match user {
        Some(user) if verify_password(&user.password_hash, password) => {
            tracing::info!("user {} logged in", user.id);
            Ok(user)
        }
        _ => {
            tracing::warn!("failed login for {:?}", username);
            Err(AppError::InvalidCredentials)
        }
    }
}

/// Mark the session as belonging to `user_id`, issuing a fresh session id.
pub async fn start_session(session: &Session, user_id: UserId) -> Result<(), AppError> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user_id).await?;
    Ok(())
}

/// The authenticated user behind the request. Rejects with a redirect to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(msg.to_string()))?;

        match session.get::<UserId>(USER_ID_KEY).await? {
            Some(user_id) => Ok(CurrentUser(user_id)),
            None => Err(AppError::Unauthenticated),
        }
    }
}
