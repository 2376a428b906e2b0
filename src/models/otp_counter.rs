use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Attempts allowed inside one 24-hour window. Issuances and failed
/// verifications draw from the same budget.
pub const DAILY_ATTEMPT_CAP: i32 = 10;

/// The fixed window length. Once it lapses the row is deleted and the
/// next event starts a fresh window at count 1.
pub const WINDOW_HOURS: i64 = 24;

/// Per-user fixed-window abuse counter.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpCounter {
    pub user_id: Uuid,
    pub count: i32,
    pub window_started_at: DateTime<Utc>,
}

impl OtpCounter {
    /// The window is `[window_started_at, window_started_at + 24h)`.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_started_at + Duration::hours(WINDOW_HOURS)
    }

    /// Whether the cap blocks further issuance/verification. A lapsed
    /// window never blocks; callers delete the row and start over.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        !self.is_lapsed(now) && self.count >= DAILY_ATTEMPT_CAP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counter(count: i32, started: DateTime<Utc>) -> OtpCounter {
        OtpCounter {
            user_id: Uuid::new_v4(),
            count,
            window_started_at: started,
        }
    }

    #[test]
    fn counter_below_cap_does_not_block() {
        let now = Utc::now();
        assert!(!counter(9, now).is_exhausted(now));
    }

    #[test]
    fn counter_at_cap_blocks_inside_window() {
        let now = Utc::now();
        assert!(counter(10, now).is_exhausted(now));
        assert!(counter(25, now).is_exhausted(now));
    }

    #[test]
    fn lapsed_window_never_blocks() {
        let now = Utc::now();
        let old = counter(10, now - Duration::hours(24));
        assert!(old.is_lapsed(now));
        assert!(!old.is_exhausted(now));
    }

    #[test]
    fn window_boundary_is_half_open() {
        let started = Utc::now();
        let c = counter(10, started);
        let just_before = started + Duration::hours(24) - Duration::seconds(1);
        let boundary = started + Duration::hours(24);
        assert!(!c.is_lapsed(just_before));
        assert!(c.is_lapsed(boundary));
    }

    proptest! {
        // A counter is never simultaneously lapsed and exhausted, and below
        // the cap it never blocks no matter where in the window we are.
        #[test]
        fn exhaustion_policy_holds(count in 0i32..100, offset_secs in 0i64..200_000) {
            let started = Utc::now();
            let now = started + Duration::seconds(offset_secs);
            let c = counter(count, started);

            prop_assert!(!(c.is_lapsed(now) && c.is_exhausted(now)));
            if count < DAILY_ATTEMPT_CAP {
                prop_assert!(!c.is_exhausted(now));
            }
            if offset_secs >= WINDOW_HOURS * 3600 {
                prop_assert!(c.is_lapsed(now));
            }
        }
    }
}
