//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// A UTC timestamp as stored on steps, stage results and offerings.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO 8601 string with microsecond precision.
///
/// # Examples
///
/// ```
/// use provisionflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Milliseconds elapsed between two timestamps, clamped at zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_ms(start: Timestamp, end: Timestamp) -> f64 {
    let micros = (end - start).num_microseconds().unwrap_or(i64::MAX).max(0);
    micros as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_elapsed_ms() {
        let start = now();
        let end = start + Duration::milliseconds(250);
        assert!((elapsed_ms(start, end) - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_elapsed_ms_clamps_negative() {
        let start = now();
        let end = start - Duration::milliseconds(5);
        assert!(elapsed_ms(start, end).abs() < f64::EPSILON);
    }
}
