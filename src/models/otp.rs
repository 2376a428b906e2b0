use chrono::{DateTime, Duration, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// How long an issued code stays verifiable.
pub const OTP_TTL_MINUTES: i64 = 3;

/// Codes are uniform five-digit integers, inclusive on both ends.
pub const OTP_CODE_MIN: u32 = 10_000;
pub const OTP_CODE_MAX: u32 = 99_999;

/// One verification attempt window for a single user. At most one row
/// exists per user; issuing a new code replaces the old row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub otp_hash: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Explicit state of a loaded record, so verifier branching is exhaustive
/// instead of being inferred from `used` plus time comparisons at each
/// call site. A deleted row (superseded or expired-and-removed) simply has
/// no state: lookups return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    Active,
    Used,
    Expired,
}

impl OtpRecord {
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::minutes(OTP_TTL_MINUTES)
    }

    /// `used` wins over expiry: a spent record is reported as spent even
    /// after its window has passed, so a second submit of a consumed code
    /// gets "already verified" rather than "expired".
    pub fn state(&self, now: DateTime<Utc>) -> OtpState {
        if self.used {
            OtpState::Used
        } else if now > self.expires_at {
            OtpState::Expired
        } else {
            OtpState::Active
        }
    }

    /// A live record blocks re-issuance until its window lapses.
    pub fn blocks_reissue(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct OtpVerifyRequest {
    /// Canonicalized at the deserialization boundary: surrounding
    /// whitespace is stripped before length validation or matching.
    #[validate(length(min = 5, max = 5))]
    #[serde(deserialize_with = "trimmed")]
    pub code: String,
}

fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: rocket::serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// The plaintext code is echoed in the response for testing and demo
/// setups; production deployments rely on the email alone.
#[derive(Debug, Serialize, JsonSchema)]
pub struct OtpIssueResponse {
    pub otp: String,
    pub otp_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OtpVerifyResponse {
    pub elevated_until: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(used: bool, created_at: DateTime<Utc>) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            otp_hash: "$argon2id$stub".to_string(),
            used,
            created_at,
            expires_at: OtpRecord::expiry_for(created_at),
        }
    }

    #[test]
    fn fresh_record_is_active() {
        let now = Utc::now();
        assert_eq!(record(false, now).state(now), OtpState::Active);
    }

    #[test]
    fn record_expires_after_three_minutes() {
        let now = Utc::now();
        let rec = record(false, now);
        assert_eq!(rec.state(now + Duration::minutes(3)), OtpState::Active);
        assert_eq!(rec.state(now + Duration::minutes(3) + Duration::seconds(1)), OtpState::Expired);
    }

    #[test]
    fn used_wins_over_expired() {
        let now = Utc::now();
        let rec = record(true, now - Duration::minutes(10));
        assert_eq!(rec.state(now), OtpState::Used);
    }

    #[test]
    fn verify_payload_trims_padding_before_validation() {
        let request: OtpVerifyRequest = serde_json::from_str(r#"{"code":"  12345  "}"#).expect("deserializes");
        assert_eq!(request.code, "12345");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn verify_payload_rejects_wrong_length() {
        let request: OtpVerifyRequest = serde_json::from_str(r#"{"code":" 1234 "}"#).expect("deserializes");
        assert!(request.validate().is_err());
    }

    #[test]
    fn live_record_blocks_reissue_until_expiry() {
        let now = Utc::now();
        let rec = record(false, now);
        assert!(rec.blocks_reissue(now + Duration::minutes(2)));
        assert!(!rec.blocks_reissue(now + Duration::minutes(4)));
    }
}
