use crate::database::otp::OtpRepository;
use crate::error::app_error::AppError;
use crate::models::otp::OtpRecord;
use crate::models::otp_counter::OtpCounter;
use crate::models::user::User;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

pub fn test_user() -> User {
    User {
        id: Uuid::new_v4(),
        fullname: "Test User".to_string(),
        username: "testuser".to_string(),
        email: "testuser@example.com".to_string(),
        password_hash: "$argon2id$stub".to_string(),
        is_channel: false,
        created_at: Utc::now(),
    }
}

/// In-memory stand-in for the Postgres OTP ledger. Mirrors the real
/// implementation's semantics: one record per user, cooldown enforced
/// inside `replace_otp`, counter window anchored at first bump.
#[derive(Default)]
pub struct MockOtpLedger {
    records: Mutex<HashMap<Uuid, OtpRecord>>,
    counters: Mutex<HashMap<Uuid, OtpCounter>>,
}

impl MockOtpLedger {
    pub async fn set_counter(&self, user_id: &Uuid, count: i32, window_started_at: DateTime<Utc>) {
        self.counters.lock().await.insert(
            *user_id,
            OtpCounter {
                user_id: *user_id,
                count,
                window_started_at,
            },
        );
    }
}

#[async_trait::async_trait]
impl OtpRepository for MockOtpLedger {
    async fn get_otp_for_user(&self, user_id: &Uuid) -> Result<Option<OtpRecord>, AppError> {
        Ok(self.records.lock().await.get(user_id).cloned())
    }

    async fn get_otp_by_id(&self, otp_id: &Uuid) -> Result<Option<OtpRecord>, AppError> {
        Ok(self.records.lock().await.values().find(|r| r.id == *otp_id).cloned())
    }

    async fn replace_otp(&self, user_id: &Uuid, otp_hash: &str, now: DateTime<Utc>) -> Result<OtpRecord, AppError> {
        let mut records = self.records.lock().await;

        if let Some(existing) = records.get(user_id)
            && existing.blocks_reissue(now)
        {
            return Err(AppError::Cooldown);
        }

        let record = OtpRecord {
            id: Uuid::new_v4(),
            user_id: *user_id,
            otp_hash: otp_hash.to_string(),
            used: false,
            created_at: now,
            expires_at: OtpRecord::expiry_for(now),
        };
        records.insert(*user_id, record.clone());

        Ok(record)
    }

    async fn mark_otp_used(&self, otp_id: &Uuid) -> Result<(), AppError> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.values_mut().find(|r| r.id == *otp_id) {
            record.used = true;
        }
        Ok(())
    }

    async fn delete_otp(&self, otp_id: &Uuid) -> Result<(), AppError> {
        self.records.lock().await.retain(|_, r| r.id != *otp_id);
        Ok(())
    }

    async fn delete_otp_for_user(&self, user_id: &Uuid) -> Result<(), AppError> {
        self.records.lock().await.remove(user_id);
        Ok(())
    }

    async fn get_counter(&self, user_id: &Uuid) -> Result<Option<OtpCounter>, AppError> {
        Ok(self.counters.lock().await.get(user_id).cloned())
    }

    async fn bump_counter(&self, user_id: &Uuid) -> Result<i32, AppError> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(*user_id).or_insert_with(|| OtpCounter {
            user_id: *user_id,
            count: 0,
            window_started_at: Utc::now(),
        });
        counter.count += 1;
        Ok(counter.count)
    }

    async fn delete_counter(&self, user_id: &Uuid) -> Result<(), AppError> {
        self.counters.lock().await.remove(user_id);
        Ok(())
    }
}

/// Records outgoing codes; can be flipped to refuse delivery so rollback
/// paths are testable.
#[derive(Default)]
pub struct MockMailer {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// (recipient, code) pairs in send order.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl crate::service::email::OtpMailer for MockMailer {
    async fn send_otp(&self, to_email: &str, _to_name: &str, code: &str) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::delivery("smtp transport refused the message"));
        }
        self.sent.lock().await.push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}
