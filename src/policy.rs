use chrono::{DateTime, Duration, Utc};

/// How long a seat hold lives before the sweep (or a lazy check) reclaims it.
pub const HOLD_DURATION_SECS: i64 = 5 * 60;

/// Maximum seats a single hold request may claim.
pub const MAX_SEATS_PER_HOLD: usize = 5;

/// Default interval between seat-hold sweep ticks.
pub const SEAT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Default interval between show-retirement sweep ticks.
pub const SHOW_SWEEP_INTERVAL_SECS: u64 = 60;

pub fn hold_deadline(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(HOLD_DURATION_SECS)
}

/// A reservation whose deadline has passed is semantically available even
/// before the sweep physically resets it.
pub fn hold_expired(reserved_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match reserved_until {
        Some(deadline) => deadline <= now,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_five_minutes_out() {
        let now = Utc::now();
        assert_eq!((hold_deadline(now) - now).num_seconds(), 300);
    }

    #[test]
    fn missing_deadline_counts_as_expired() {
        assert!(hold_expired(None, Utc::now()));
    }

    #[test]
    fn future_deadline_is_live() {
        let now = Utc::now();
        assert!(!hold_expired(Some(now + Duration::seconds(1)), now));
        assert!(hold_expired(Some(now), now));
    }
}
