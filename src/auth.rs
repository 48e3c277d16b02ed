use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{session::Session, user::NewUser},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, FromRow)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub display_name: String,
}

/// The caller, if the request carried a live bearer token.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        else {
            return Ok(Self(None));
        };

        let user = verify_token(state, bearer.token()).await?;
        if let Some(user) = &user {
            parts.extensions.insert(user.clone());
        }
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored password hash is invalid: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub async fn register_user(state: &AppState, new_user: NewUser) -> Result<AuthenticatedUser, AppError> {
    let username = new_user.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required.".into()));
    }
    if new_user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")
        .bind(username)
        .fetch_one(&state.db)
        .await?;
    if taken {
        return Err(AppError::BadRequest("Username already exists.".into()));
    }

    let password_hash = hash_password(&new_user.password)?;
    let uuid = Uuid::new_v4().to_string();
    let display_name = new_user.display_name.trim().to_string();

    let mut tx = state.db.begin().await?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (uuid, username, password_hash, display_name, gender, dob, vehicle, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING id
        "#,
    )
    .bind(&uuid)
    .bind(username)
    .bind(&password_hash)
    .bind(&display_name)
    .bind(new_user.gender)
    .bind(new_user.dob)
    .bind(&new_user.vehicle)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    let contact = &new_user.contact;
    sqlx::query(
        r#"
        INSERT INTO user_contacts (user_id, phone, email, address, district, city)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(id)
    .bind(&contact.phone)
    .bind(contact.email.trim())
    .bind(contact.address.trim())
    .bind(&contact.district)
    .bind(&contact.city)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(user_id = id, %username, "user registered");
    Ok(AuthenticatedUser {
        id,
        uuid,
        username: username.to_string(),
        display_name,
    })
}

/// Checks `password` for `username`. Unknown users and wrong passwords both
/// yield `Unauthorized`.
pub async fn authenticate_user(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    #[derive(FromRow)]
    struct Credentials {
        id: i64,
        uuid: String,
        username: String,
        display_name: String,
        password_hash: String,
    }

    let row = sqlx::query_as::<_, Credentials>(
        "SELECT id, uuid, username, display_name, password_hash FROM users WHERE username = ?1",
    )
    .bind(username.trim())
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    if !verify_password(password, &row.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
        .bind(Utc::now())
        .bind(row.id)
        .execute(&state.db)
        .await?;

    Ok(AuthenticatedUser {
        id: row.id,
        uuid: row.uuid,
        username: row.username,
        display_name: row.display_name,
    })
}

/// Issues a new bearer token. Only its digest is stored.
pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, user_id, created_at, last_seen_at, expires_at)
        VALUES (?1, ?2, ?3, ?3, ?4)
        "#,
    )
    .bind(token_digest(&token))
    .bind(user_id)
    .bind(now)
    .bind(now + state.config.session_ttl)
    .execute(&state.db)
    .await?;
    Ok(token)
}

pub async fn destroy_session(state: &AppState, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
        .bind(token_digest(token))
        .execute(&state.db)
        .await?;
    Ok(())
}

/// Resolves a bearer token to its user. Expired sessions are removed and
/// treated as absent.
pub async fn verify_token(
    state: &AppState,
    token: &str,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let digest = token_digest(token);
    let Some(session) = sqlx::query_as::<_, Session>(
        "SELECT token_hash, user_id, created_at, last_seen_at, expires_at FROM sessions WHERE token_hash = ?1",
    )
    .bind(&digest)
    .fetch_optional(&state.db)
    .await?
    else {
        return Ok(None);
    };

    let now = Utc::now();
    if session.is_expired(now) {
        debug!(user_id = session.user_id, "session expired");
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
            .bind(&digest)
            .execute(&state.db)
            .await?;
        return Ok(None);
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE token_hash = ?2")
        .bind(now)
        .bind(&digest)
        .execute(&state.db)
        .await?;

    let user = sqlx::query_as::<_, AuthenticatedUser>(
        "SELECT id, uuid, username, display_name FROM users WHERE id = ?1",
    )
    .bind(session.user_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(user)
}

pub async fn change_password(
    state: &AppState,
    user_id: i64,
    current: &str,
    new: &str,
    confirm: &str,
) -> Result<(), AppError> {
    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    if new != confirm {
        return Err(AppError::BadRequest("New passwords don't match!".into()));
    }
    if !verify_password(current, &stored)? {
        return Err(AppError::BadRequest("Incorrect current password.".into()));
    }
    if current == new {
        return Err(AppError::BadRequest(
            "New password can not be the same as current password.".into(),
        ));
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
        .bind(hash_password(new)?)
        .bind(user_id)
        .execute(&state.db)
        .await?;
    info!(user_id, "password changed");
    Ok(())
}
