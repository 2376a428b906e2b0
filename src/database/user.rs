use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::User;
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, Salt, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once at startup, used as a timing decoy
/// so that login requests for non-existent users take the same time as
/// requests for existing users.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"dummy-never-matches", Salt::from(&salt))
        .expect("failed to generate dummy hash")
        .to_string()
});

impl PostgresRepository {
    pub async fn create_user(&self, fullname: &str, username: &str, email: &str, password: &str, is_channel: bool) -> Result<User, AppError> {
        let password_hash = hash_secret(password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (fullname, username, email, password_hash, is_channel)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, fullname, username, email, password_hash, is_channel, created_at
            "#,
        )
        .bind(fullname)
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(is_channel)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, fullname, username, email, password_hash, is_channel, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, fullname, username, email, password_hash, is_channel, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn user_exists(&self, username: &str, email: &str) -> Result<bool, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE username = $1 OR email = $2
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }

    pub async fn verify_password(&self, user: &User, password: &str) -> Result<(), AppError> {
        if !verify_secret(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }
        Ok(())
    }

    /// Perform a throwaway Argon2 verification to equalize response timing
    /// regardless of whether the target account exists.
    pub fn dummy_verify(password: &str) {
        let hash = PasswordHash::new(&DUMMY_HASH).expect("invalid dummy hash");
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }

    /// Update the password hash directly, used by the step-up-gated reset
    /// flow where possession of the elevation cookie replaces knowledge of
    /// the current password.
    pub async fn update_user_password(&self, user_id: &Uuid, new_password: &str) -> Result<(), AppError> {
        let new_hash = hash_secret(new_password)?;

        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&new_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Deleting a user cascades to sessions, otp, and otp_counts rows.
    pub async fn delete_user(&self, id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;

        Ok(())
    }
}

/// Hash a secret (password or OTP code) with the crate-wide slow adaptive
/// hash. The produced PHC string embeds salt and parameters.
pub(crate) fn hash_secret(plaintext: &str) -> Result<String, AppError> {
    let salt_string = SaltString::generate(&mut OsRng);
    let salt = Salt::from(&salt_string);
    let hash = PasswordHash::generate(Argon2::default(), plaintext.as_bytes(), salt)?;

    Ok(hash.to_string())
}

/// Constant-shape verification; only ever compare through this, never by
/// string equality on the stored value.
pub(crate) fn verify_secret(plaintext: &str, stored: &str) -> Result<bool, AppError> {
    let hash = PasswordHash::new(stored).map_err(|e| AppError::password_hash("Failed to parse stored hash", e))?;
    Ok(Argon2::default().verify_password(plaintext.as_bytes(), &hash).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_secret("54321").expect("hashes");
        assert!(verify_secret("54321", &hash).expect("verifies"));
        assert!(!verify_secret("54322", &hash).expect("verifies"));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_secret("54321").expect("hashes");
        let b = hash_secret("54321").expect("hashes");
        assert_ne!(a, b);
    }

    #[test]
    fn dummy_verify_does_not_panic() {
        PostgresRepository::dummy_verify("anything");
    }
}
