//! Wall-clock gating for activities.
//!
//! A schedule delays an activity's readiness until a moment: either an
//! absolute `start` instant, or a moment relative to submission expressed as
//! an `interval` alone. With both, `interval` makes the activity recurring
//! (each restart is due one interval after the previous due time).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Schedule section of an activity definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    /// Absolute moment the activity becomes eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    /// Interval like `"12h"`, `"30m"`, `"1d6h"`, `"90s"`.
    ///
    /// Without `start`, the first due moment is one interval after
    /// submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl ScheduleSpec {
    /// Validates that the schedule names a moment and its interval parses.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.start.is_none() && self.interval.is_none() {
            return Err(ManagerError::validation(
                "schedule requires a start time or an interval",
            ));
        }
        if let Some(interval) = &self.interval {
            parse_interval(interval)?;
        }
        Ok(())
    }

    /// The parsed interval, if any.
    pub fn interval_duration(&self) -> Option<Duration> {
        self.interval
            .as_deref()
            .and_then(|text| parse_interval(text).ok())
    }

    /// First moment the activity is due after submission at `now`.
    pub fn first_due(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (self.start, self.interval_duration()) {
            (Some(start), _) => start,
            (None, Some(interval)) => now + interval,
            // validate() rejects this shape; fall back to "due now".
            (None, None) => now,
        }
    }

    /// Next due moment after a completed run that was due at `previous`.
    ///
    /// Catch-up is skipped: the result is always in the future of `now`.
    pub fn next_due(&self, previous: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.interval_duration()?;
        let mut due = previous + interval;
        while due <= now {
            due = due + interval;
        }
        Some(due)
    }
}

/// Parses an interval like `"1d6h30m10s"`. Every component is optional but
/// at least one must be present; components must appear largest-first.
pub fn parse_interval(text: &str) -> Result<Duration, ManagerError> {
    let mut seconds: i64 = 0;
    let mut number = String::new();
    let mut seen_any = false;
    let mut last_unit_rank = 0u8;

    for ch in text.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
            continue;
        }

        let (factor, rank) = match ch {
            'd' => (86_400, 1),
            'h' => (3_600, 2),
            'm' => (60, 3),
            's' => (1, 4),
            _ => {
                return Err(ManagerError::validation(format!(
                    "invalid interval unit '{ch}' in \"{text}\""
                )));
            }
        };

        if number.is_empty() || rank <= last_unit_rank {
            return Err(ManagerError::validation(format!(
                "invalid interval \"{text}\""
            )));
        }
        last_unit_rank = rank;

        let value: i64 = number
            .parse()
            .map_err(|_| ManagerError::validation(format!("invalid interval \"{text}\"")))?;
        seconds += value * factor;
        number.clear();
        seen_any = true;
    }

    if !number.is_empty() || !seen_any || seconds <= 0 {
        return Err(ManagerError::validation(format!(
            "invalid interval \"{text}\""
        )));
    }

    Ok(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_compound_intervals() {
        assert_eq!(parse_interval("90s").expect("interval"), Duration::seconds(90));
        assert_eq!(parse_interval("15m").expect("interval"), Duration::minutes(15));
        assert_eq!(
            parse_interval("1d6h30m10s").expect("interval"),
            Duration::seconds(86_400 + 6 * 3_600 + 30 * 60 + 10)
        );
    }

    #[test]
    fn rejects_malformed_intervals() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("12").is_err());
        assert!(parse_interval("h").is_err());
        assert!(parse_interval("5m1h").is_err());
        assert!(parse_interval("3x").is_err());
        assert!(parse_interval("0s").is_err());
    }

    #[test]
    fn interval_without_start_is_relative_to_submission() {
        let spec = ScheduleSpec {
            start: None,
            interval: Some("30m".to_string()),
        };
        let now = Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(spec.first_due(now), now + Duration::minutes(30));
    }

    #[test]
    fn next_due_skips_missed_periods() {
        let spec = ScheduleSpec {
            start: None,
            interval: Some("1h".to_string()),
        };
        let due = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2021, 5, 1, 3, 30, 0).unwrap();
        assert_eq!(
            spec.next_due(due, now),
            Some(Utc.with_ymd_and_hms(2021, 5, 1, 4, 0, 0).unwrap())
        );
    }

    #[test]
    fn empty_schedule_fails_validation() {
        let spec = ScheduleSpec {
            start: None,
            interval: None,
        };
        assert!(spec.validate().is_err());
    }
}
