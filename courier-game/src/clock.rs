//! Mapping between wall-clock timestamps and game seconds
use chrono::{DateTime, FixedOffset, NaiveDateTime, ParseError};

/// Epoch of the default run: 2025-09-01T12:00:00Z.
const DEFAULT_START_UNIX: i64 = 1_756_728_000;

/// Anchors game seconds (`0.0` at run start) to absolute timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    start: DateTime<FixedOffset>,
}

impl RunClock {
    #[must_use]
    pub const fn new(start: DateTime<FixedOffset>) -> Self {
        Self { start }
    }

    /// Parse the run start from an ISO-8601 timestamp.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error when the text is not a timestamp.
    pub fn parse(start: &str) -> Result<Self, ParseError> {
        parse_timestamp(start).map(Self::new)
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// Game seconds from run start until `timestamp`. Negative if it precedes the start.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error for malformed timestamps.
    pub fn seconds_until(&self, timestamp: &str) -> Result<f64, ParseError> {
        let at = parse_timestamp(timestamp)?;
        let millis = at.signed_duration_since(self.start).num_milliseconds();
        #[allow(clippy::cast_precision_loss)]
        Ok(millis as f64 / 1000.0)
    }
}

impl Default for RunClock {
    fn default() -> Self {
        let start = DateTime::from_timestamp(DEFAULT_START_UNIX, 0)
            .map(|utc| utc.fixed_offset())
            .unwrap_or_default();
        Self::new(start)
    }
}

/// RFC 3339 (including the `Z` suffix), or a naive `YYYY-MM-DDTHH:MM:SS` read as UTC.
fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text).or_else(|err| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .map(|naive| naive.and_utc().fixed_offset())
            .map_err(|_| err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_start_matches_demo_city() {
        let clock = RunClock::default();
        assert_eq!(
            clock.seconds_until("2025-09-01T12:00:00Z").ok(),
            Some(0.0)
        );
    }

    #[test]
    fn offsets_are_relative_to_start() {
        let clock = RunClock::parse("2025-09-01T12:00:00+00:00").unwrap();
        assert_eq!(clock.seconds_until("2025-09-01T12:05:30Z").ok(), Some(330.0));
        assert_eq!(clock.seconds_until("2025-09-01T12:10:00").ok(), Some(600.0));
        assert_eq!(clock.seconds_until("2025-09-01T11:59:00Z").ok(), Some(-60.0));
    }

    #[test]
    fn malformed_timestamps_fail() {
        let clock = RunClock::default();
        assert!(clock.seconds_until("tomorrow-ish").is_err());
        assert!(RunClock::parse("").is_err());
    }
}
