use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Cookie holding the step-up credential. Stored as a Rocket private
/// cookie, so the value below travels encrypted and authenticated under
/// the server secret key.
pub const ELEVATION_COOKIE: &str = "elevation";

/// Claims minted after a successful OTP verification. The claims carry no
/// independent trust: the step-up guard re-reads the referenced otp row on
/// every request, so deleting that row revokes outstanding elevations
/// immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationClaims {
    pub user_id: Uuid,
    pub otp_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl ElevationClaims {
    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.otp_id, self.expires_at.to_rfc3339())
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (user_id_str, rest) = value.split_once(':')?;
        let (otp_id_str, expiry_str) = rest.split_once(':')?;
        Some(Self {
            user_id: Uuid::parse_str(user_id_str).ok()?,
            otp_id: Uuid::parse_str(otp_id_str).ok()?,
            expires_at: DateTime::parse_from_rfc3339(expiry_str).ok()?.with_timezone(&Utc),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims() -> ElevationClaims {
        ElevationClaims {
            user_id: Uuid::new_v4(),
            otp_id: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[test]
    fn encode_parse_round_trip() {
        let original = claims();
        let parsed = ElevationClaims::parse(&original.encode()).expect("parses");
        assert_eq!(parsed.user_id, original.user_id);
        assert_eq!(parsed.otp_id, original.otp_id);
        assert_eq!(parsed.expires_at, original.expires_at);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ElevationClaims::parse("").is_none());
        assert!(ElevationClaims::parse("no-delimiters").is_none());
        assert!(ElevationClaims::parse("a:b:c").is_none());
        let half = format!("{}:{}", Uuid::new_v4(), Uuid::new_v4());
        assert!(ElevationClaims::parse(&half).is_none());
    }

    #[test]
    fn expiry_check() {
        let mut c = claims();
        assert!(!c.is_expired(Utc::now()));
        c.expires_at = Utc::now() - Duration::seconds(1);
        assert!(c.is_expired(Utc::now()));
    }
}
