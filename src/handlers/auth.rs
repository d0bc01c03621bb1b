// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{Credentials, User},
    utils::{
        hash::{hash_password, verify_password},
        jwt::{ROLE_ADMIN, ROLE_LEARNER, sign_jwt},
    },
};

const BAD_CREDENTIALS: &str = "Invalid e-mail or password";

/// Creates a learner account.
///
/// Addresses listed in `ADMIN_EMAILS` cannot be claimed here; those accounts
/// are provisioned at startup by [`provision_admins`].
pub async fn register(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = payload.normalized_email();
    if config.is_admin_email(&email) {
        return Err(AppError::Forbidden(
            "This address is reserved for an administrator".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash) VALUES (?, ?) \
         RETURNING id, email, password_hash",
    )
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict(format!("'{}' is already registered", email)),
        other => {
            tracing::error!("Failed to register user: {}", other);
            other
        }
    })?;

    tracing::info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Checks e-mail and password and returns a JWT token. Addresses listed in
/// `ADMIN_EMAILS` receive the admin role.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = payload.normalized_email();

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, password_hash FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = match user {
        Some(user) if verify_password(&payload.password, user.password_hash.as_deref()) => user,
        _ => {
            tracing::info!("Rejected login for {}", email);
            return Err(AppError::AuthError(BAD_CREDENTIALS.to_string()));
        }
    };

    let role = if config.is_admin_email(&user.email) {
        ROLE_ADMIN
    } else {
        ROLE_LEARNER
    };

    let token = sign_jwt(user.id, role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": role,
        "user": user
    })))
}

/// Gives every address in `ADMIN_EMAILS` an account with the password from
/// `ADMIN_PASSWORD`. Accounts that already have a password keep it.
/// Returns how many accounts were created or given a password.
pub async fn provision_admins(pool: &SqlitePool, config: &Config) -> Result<u64, AppError> {
    let Some(password) = config.admin_password.as_deref() else {
        if !config.admin_emails.is_empty() {
            tracing::warn!("ADMIN_PASSWORD not set; admin accounts are not provisioned");
        }
        return Ok(0);
    };

    let mut created = 0;
    for email in &config.admin_emails {
        let hash = hash_password(password)?;
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash) VALUES (?, ?) \
             ON CONFLICT(email) DO UPDATE SET password_hash = excluded.password_hash \
             WHERE users.password_hash IS NULL",
        )
        .bind(email.trim().to_lowercase())
        .bind(hash)
        .execute(pool)
        .await?;
        created += result.rows_affected();
    }
    if created > 0 {
        tracing::info!("Provisioned {} admin account(s)", created);
    }
    Ok(created)
}
