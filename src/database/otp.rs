use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::otp::OtpRecord;
use crate::models::otp_counter::OtpCounter;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage operations for the OTP ledger and the per-user abuse counter.
/// The issuer/verifier state machines in `service::otp` run against this
/// trait so they can be exercised with an in-memory ledger in tests.
#[async_trait::async_trait]
pub trait OtpRepository {
    async fn get_otp_for_user(&self, user_id: &Uuid) -> Result<Option<OtpRecord>, AppError>;
    async fn get_otp_by_id(&self, otp_id: &Uuid) -> Result<Option<OtpRecord>, AppError>;

    /// Replace whatever record the user currently holds with a fresh one.
    /// Must be atomic per user: concurrent calls serialize, and afterwards
    /// exactly one live record exists. Fails with `Cooldown` if a live
    /// (unexpired) record is found once the per-user lock is held.
    async fn replace_otp(&self, user_id: &Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<OtpRecord, AppError>;

    async fn mark_otp_used(&self, otp_id: &Uuid) -> Result<(), AppError>;
    async fn delete_otp(&self, otp_id: &Uuid) -> Result<(), AppError>;
    async fn delete_otp_for_user(&self, user_id: &Uuid) -> Result<(), AppError>;

    async fn get_counter(&self, user_id: &Uuid) -> Result<Option<OtpCounter>, AppError>;

    /// Single round-trip increment-or-insert; returns the new count.
    async fn bump_counter(&self, user_id: &Uuid) -> Result<i32, AppError>;

    async fn delete_counter(&self, user_id: &Uuid) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl OtpRepository for PostgresRepository {
    async fn get_otp_for_user(&self, user_id: &Uuid) -> Result<Option<OtpRecord>, AppError> {
        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
            SELECT id, user_id, otp_hash, used, created_at, expires_at
            FROM otp
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_otp_by_id(&self, otp_id: &Uuid) -> Result<Option<OtpRecord>, AppError> {
        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
            SELECT id, user_id, otp_hash, used, created_at, expires_at
            FROM otp
            WHERE id = $1
            "#,
        )
        .bind(otp_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn replace_otp(&self, user_id: &Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<OtpRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent issuance for the same user; combined with
        // UNIQUE(user_id) this keeps "at most one live record" atomic.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, OtpRecord>(
            r#"
            SELECT id, user_id, otp_hash, used, created_at, expires_at
            FROM otp
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(record) = existing {
            // Any unexpired record blocks re-issuance, spent or not.
            if record.blocks_reissue(now) {
                return Err(AppError::Cooldown);
            }
            sqlx::query("DELETE FROM otp WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        }

        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
            INSERT INTO otp (user_id, otp_hash, used, created_at, expires_at)
            VALUES ($1, $2, FALSE, $3, $4)
            RETURNING id, user_id, otp_hash, used, created_at, expires_at
            "#,
        )
        .bind(user_id)
        .bind(otp_hash)
        .bind(now)
        .bind(OtpRecord::expiry_for(now))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record)
    }

    async fn mark_otp_used(&self, otp_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE otp SET used = TRUE WHERE id = $1")
            .bind(otp_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_otp(&self, otp_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM otp WHERE id = $1").bind(otp_id).execute(&self.pool).await?;

        Ok(())
    }

    async fn delete_otp_for_user(&self, user_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM otp WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;

        Ok(())
    }

    async fn get_counter(&self, user_id: &Uuid) -> Result<Option<OtpCounter>, AppError> {
        let counter = sqlx::query_as::<_, OtpCounter>(
            r#"
            SELECT user_id, count, window_started_at
            FROM otp_counts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counter)
    }

    async fn bump_counter(&self, user_id: &Uuid) -> Result<i32, AppError> {
        // Server-side increment, no read-modify-write race. The window
        // anchor is kept from the first event in the window.
        let row: (i32,) = sqlx::query_as(
            r#"
            INSERT INTO otp_counts (user_id, count, window_started_at)
            VALUES ($1, 1, now())
            ON CONFLICT (user_id)
            DO UPDATE SET count = otp_counts.count + 1
            RETURNING count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    async fn delete_counter(&self, user_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM otp_counts WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
