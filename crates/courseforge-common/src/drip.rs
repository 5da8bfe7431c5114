//! Drip-content unlock calculation.
//!
//! A lesson is either available immediately, some number of days after the
//! student enrolled, or on a fixed calendar date.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest day offset a lesson may be dripped by (about a century).
pub const MAX_DRIP_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DripError {
    #[error("Unknown drip type \"{0}\"")]
    UnknownType(String),
    #[error("drip_days is required for days_after_enrollment and must be >= 0")]
    MissingDays,
    #[error("drip_date is required for fixed_date")]
    MissingDate,
    #[error("Drip offset must be at most {MAX_DRIP_DAYS} days")]
    TooManyDays,
}

/// How a lesson's availability is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DripPolicy {
    Immediate,
    DaysAfterEnrollment { days: u32 },
    FixedDate { date: DateTime<Utc> },
}

/// Computed availability of one lesson for one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DripStatus {
    pub unlocked: bool,
    pub unlock_at: DateTime<Utc>,
    pub seconds_remaining: i64,
}

impl DripPolicy {
    /// Build a policy from the `lessons.drip_type` / `drip_days` / `drip_date` columns.
    pub fn from_columns(
        drip_type: &str,
        drip_days: Option<i32>,
        drip_date: Option<DateTime<Utc>>,
    ) -> Result<Self, DripError> {
        match drip_type {
            "immediate" => Ok(Self::Immediate),
            "days_after_enrollment" => {
                let days = drip_days
                    .and_then(|d| u32::try_from(d).ok())
                    .ok_or(DripError::MissingDays)?;
                Ok(Self::DaysAfterEnrollment { days })
            }
            "fixed_date" => drip_date
                .map(|date| Self::FixedDate { date })
                .ok_or(DripError::MissingDate),
            other => Err(DripError::UnknownType(other.to_string())),
        }
    }

    /// The inverse of [`DripPolicy::from_columns`].
    pub fn to_columns(&self) -> (&'static str, Option<i32>, Option<DateTime<Utc>>) {
        match *self {
            Self::Immediate => ("immediate", None, None),
            Self::DaysAfterEnrollment { days } => {
                ("days_after_enrollment", Some(days.min(i32::MAX as u32) as i32), None)
            }
            Self::FixedDate { date } => ("fixed_date", None, Some(date)),
        }
    }

    /// Reject policies a creator should not be able to store.
    pub fn check(&self) -> Result<(), DripError> {
        match *self {
            Self::DaysAfterEnrollment { days } if days > MAX_DRIP_DAYS => Err(DripError::TooManyDays),
            _ => Ok(()),
        }
    }

    /// Offsets past the end of the calendar saturate to the latest representable instant.
    pub fn unlock_at(&self, enrolled_at: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Immediate => enrolled_at,
            Self::DaysAfterEnrollment { days } => Duration::try_days(i64::from(days))
                .and_then(|offset| enrolled_at.checked_add_signed(offset))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Self::FixedDate { date } => date,
        }
    }

    pub fn is_unlocked(&self, enrolled_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.unlock_at(enrolled_at)
    }

    pub fn status(&self, enrolled_at: DateTime<Utc>, now: DateTime<Utc>) -> DripStatus {
        let unlock_at = self.unlock_at(enrolled_at);
        DripStatus {
            unlocked: now >= unlock_at,
            unlock_at,
            seconds_remaining: (unlock_at - now).num_seconds().max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn immediate_unlocks_at_enrollment() {
        let enrolled = utc("2024-03-01T12:00:00Z");
        let policy = DripPolicy::Immediate;
        assert_eq!(policy.unlock_at(enrolled), enrolled);
        assert!(policy.is_unlocked(enrolled, enrolled));
    }

    #[test]
    fn day_offset_unlocks_exactly_n_days_later() {
        let enrolled = utc("2024-03-01T12:00:00Z");
        let policy = DripPolicy::DaysAfterEnrollment { days: 7 };
        assert_eq!(policy.unlock_at(enrolled), utc("2024-03-08T12:00:00Z"));
        assert!(!policy.is_unlocked(enrolled, utc("2024-03-08T11:59:59Z")));
        assert!(policy.is_unlocked(enrolled, utc("2024-03-08T12:00:00Z")));
    }

    #[test]
    fn fixed_date_ignores_enrollment() {
        let launch = utc("2024-06-01T00:00:00Z");
        let policy = DripPolicy::FixedDate { date: launch };
        assert_eq!(policy.unlock_at(utc("2023-01-01T00:00:00Z")), launch);
        assert_eq!(policy.unlock_at(utc("2025-01-01T00:00:00Z")), launch);
    }

    #[test]
    fn status_reports_remaining_time() {
        let enrolled = utc("2024-03-01T00:00:00Z");
        let policy = DripPolicy::DaysAfterEnrollment { days: 1 };

        let locked = policy.status(enrolled, utc("2024-03-01T23:00:00Z"));
        assert!(!locked.unlocked);
        assert_eq!(locked.seconds_remaining, 3600);

        let open = policy.status(enrolled, utc("2024-03-05T00:00:00Z"));
        assert!(open.unlocked);
        assert_eq!(open.seconds_remaining, 0);
    }

    #[test]
    fn columns_round_trip_and_validate() {
        let date = utc("2024-06-01T00:00:00Z");
        for policy in [
            DripPolicy::Immediate,
            DripPolicy::DaysAfterEnrollment { days: 3 },
            DripPolicy::FixedDate { date },
        ] {
            let (t, d, dt) = policy.to_columns();
            assert_eq!(DripPolicy::from_columns(t, d, dt).unwrap(), policy);
        }

        assert_eq!(
            DripPolicy::from_columns("days_after_enrollment", None, None),
            Err(DripError::MissingDays)
        );
        assert_eq!(
            DripPolicy::from_columns("days_after_enrollment", Some(-2), None),
            Err(DripError::MissingDays)
        );
        assert_eq!(DripPolicy::from_columns("fixed_date", None, None), Err(DripError::MissingDate));
        assert!(matches!(
            DripPolicy::from_columns("weekly", None, None),
            Err(DripError::UnknownType(_))
        ));
    }

    #[test]
    fn oversized_offsets_are_rejected_on_input() {
        assert!(DripPolicy::DaysAfterEnrollment { days: MAX_DRIP_DAYS }.check().is_ok());
        assert_eq!(
            DripPolicy::DaysAfterEnrollment { days: MAX_DRIP_DAYS + 1 }.check(),
            Err(DripError::TooManyDays)
        );
        assert!(DripPolicy::Immediate.check().is_ok());
    }

    #[test]
    fn stored_huge_offset_saturates_instead_of_overflowing() {
        let policy: DripPolicy =
            serde_json::from_str(r#"{"type":"days_after_enrollment","days":4000000000}"#).unwrap();
        let (t, d, dt) = policy.to_columns();
        let stored = DripPolicy::from_columns(t, d, dt).unwrap();

        let now = utc("2024-03-01T00:00:00Z");
        let status = stored.status(now, now);
        assert!(!status.unlocked);
        assert_eq!(status.unlock_at, DateTime::<Utc>::MAX_UTC);
        assert!(status.seconds_remaining > 0);
    }
}
