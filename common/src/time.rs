//! Time utilities for reservation leases.

use chrono::{DateTime, TimeDelta, Utc};

/// Shortest reservation lease a deployment may configure.
pub const MIN_RESERVATION_TTL: std::time::Duration = std::time::Duration::from_secs(1);

/// A timestamp, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert a std duration into a chrono duration, saturating on overflow.
pub fn from_std(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_std() {
        let d = from_std(std::time::Duration::from_millis(1500));
        assert_eq!(d, TimeDelta::milliseconds(1500));
        assert_eq!(from_std(std::time::Duration::MAX), TimeDelta::MAX);
    }

    #[test]
    fn test_lease_arithmetic() {
        let start = now();
        let end = start + from_std(MIN_RESERVATION_TTL);
        assert_eq!((end - start).num_seconds(), 1);
    }
}
