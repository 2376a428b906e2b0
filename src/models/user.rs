use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};
use zxcvbn::{Score, zxcvbn};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_channel: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub is_channel: bool,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub fullname: String,
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[serde(default)]
    pub is_channel: bool,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

/// New password submitted through the step-up-gated reset endpoint.
#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8))]
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            is_channel: user.is_channel,
        }
    }
}

/// Usernames are stored case-folded and whitespace-stripped so uniqueness
/// is not defeated by cosmetic variants.
pub fn canonical_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let estimate = zxcvbn(password, &[]);
    if estimate.score() < Score::Three {
        return Err(ValidationError::new("password_too_weak"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_username_folds_case_and_whitespace() {
        assert_eq!(canonical_username("  StreamQueen "), "streamqueen");
        assert_eq!(canonical_username("plain"), "plain");
    }

    #[test]
    fn weak_passwords_are_rejected() {
        assert!(validate_password_strength("password1").is_err());
        assert!(validate_password_strength("correct horse battery staple").is_ok());
    }

    #[test]
    fn register_request_validation() {
        let request = RegisterRequest {
            fullname: "Ada Lovelace".to_string(),
            username: "ada".to_string(),
            email: "not-an-email".to_string(),
            password: "correct horse battery staple".to_string(),
            is_channel: false,
        };
        assert!(request.validate().is_err());
    }
}
