use crate::database::otp::OtpRepository;
use crate::database::user::{hash_secret, verify_secret};
use crate::error::app_error::AppError;
use crate::models::elevation::ElevationClaims;
use crate::models::otp::{OTP_CODE_MAX, OTP_CODE_MIN, OtpRecord, OtpState};
use crate::models::user::User;
use crate::service::email::OtpMailer;
use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
pub struct IssuedOtp {
    pub record: OtpRecord,
    pub code: String,
}

/// Issuer and verifier state machines. Both run against the repository
/// trait so the whole flow is unit-testable with an in-memory ledger.
pub struct OtpService<'a, R, M>
where
    R: OtpRepository + Sync,
    M: OtpMailer + Sync,
{
    pub repo: &'a R,
    pub mailer: &'a M,
}

/// Uniform five-digit code; `random_range` is rejection-sampled, no
/// modulo bias.
fn generate_code() -> String {
    rand::rng().random_range(OTP_CODE_MIN..=OTP_CODE_MAX).to_string()
}

impl<'a, R, M> OtpService<'a, R, M>
where
    R: OtpRepository + Sync,
    M: OtpMailer + Sync,
{
    pub fn new(repo: &'a R, mailer: &'a M) -> Self {
        Self { repo, mailer }
    }

    pub async fn issue(&self, user: &User) -> Result<IssuedOtp, AppError> {
        self.issue_at(user, Utc::now()).await
    }

    pub async fn verify(&self, user_id: &Uuid, submitted_code: &str, elevation_ttl: Duration) -> Result<ElevationClaims, AppError> {
        self.verify_at(user_id, submitted_code, elevation_ttl, Utc::now()).await
    }

    pub(crate) async fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedOtp, AppError> {
        // Cooldown before cap: a live record means the client must wait
        // out the current window regardless of budget.
        if let Some(existing) = self.repo.get_otp_for_user(&user.id).await?
            && existing.blocks_reissue(now)
        {
            return Err(AppError::Cooldown);
        }

        self.enforce_daily_cap(&user.id, now).await?;

        let code = generate_code();
        let otp_hash = hash_secret(&code)?;

        let record = self.repo.replace_otp(&user.id, &otp_hash, now).await?;
        let count = self.repo.bump_counter(&user.id).await?;

        debug!(user_id = %user.id, otp_id = %record.id, attempt_count = count, "verification code issued");

        // An un-sent code must not persist as if it were live.
        if let Err(e) = self.mailer.send_otp(&user.email, &user.fullname, &code).await {
            self.repo.delete_otp(&record.id).await?;
            return Err(e);
        }

        Ok(IssuedOtp { record, code })
    }

    pub(crate) async fn verify_at(
        &self,
        user_id: &Uuid,
        submitted_code: &str,
        elevation_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ElevationClaims, AppError> {
        let record = self.repo.get_otp_for_user(user_id).await?.ok_or(AppError::OtpNotFound)?;

        match record.state(now) {
            // A spent record reports as spent unconditionally; the cap does
            // not apply to a code that can no longer be consumed.
            OtpState::Used => Err(AppError::AlreadyVerified),
            OtpState::Expired => {
                // Cap before expiry: an exhausted caller must not learn
                // whether their code merely timed out.
                self.enforce_daily_cap(user_id, now).await?;

                // A timed-out code cannot be retried.
                self.repo.delete_otp(&record.id).await?;
                self.repo.bump_counter(user_id).await?;
                Err(AppError::OtpExpired)
            }
            OtpState::Active => {
                // Cap before match, same masking rationale as above.
                self.enforce_daily_cap(user_id, now).await?;

                if !verify_secret(submitted_code, &record.otp_hash)? {
                    self.repo.bump_counter(user_id).await?;
                    return Err(AppError::OtpMismatch);
                }

                self.repo.mark_otp_used(&record.id).await?;
                info!(user_id = %user_id, otp_id = %record.id, "verification code accepted");

                Ok(ElevationClaims {
                    user_id: *user_id,
                    otp_id: record.id,
                    expires_at: now + elevation_ttl,
                })
            }
        }
    }

    /// Lapsed windows are reset by deleting the row; within the window the
    /// fixed threshold applies.
    async fn enforce_daily_cap(&self, user_id: &Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(counter) = self.repo.get_counter(user_id).await? {
            if counter.is_lapsed(now) {
                self.repo.delete_counter(user_id).await?;
            } else if counter.is_exhausted(now) {
                return Err(AppError::RateLimited);
            }
        }
        Ok(())
    }
}
