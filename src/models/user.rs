// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique, stored lower-cased.
    pub email: String,

    /// Argon2 PHC string. `None` for accounts that predate passwords.
    #[serde(skip)]
    pub password_hash: Option<String>,
}

/// DTO for registration and login.
#[derive(Debug, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "A valid e-mail address is required."), length(max = 254))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters."))]
    pub password: String,
}

impl Credentials {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}
