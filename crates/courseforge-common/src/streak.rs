//! Learning streaks — consecutive days with at least one completed lesson.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Persisted streak state for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub current: i32,
    pub longest: i32,
    pub last_activity: Option<NaiveDate>,
}

impl StreakState {
    /// Fold one day of activity into the streak.
    ///
    /// Activity on the same day is a no-op, the next calendar day extends
    /// the streak, and anything later starts over at 1. Dates earlier than
    /// the last recorded activity are ignored.
    pub fn record_activity(self, today: NaiveDate) -> Self {
        let current = match self.last_activity {
            Some(last) if today <= last => return self,
            Some(last) if last.succ_opt() == Some(today) => self.current + 1,
            _ => 1,
        };

        Self {
            current,
            longest: self.longest.max(current),
            last_activity: Some(today),
        }
    }

    /// A streak survives until a full calendar day passes without activity.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        match self.last_activity {
            Some(last) => last == today || last.succ_opt() == Some(today),
            None => false,
        }
    }

    /// The streak as it should be shown today: broken streaks read as 0.
    pub fn effective_current(&self, today: NaiveDate) -> i32 {
        if self.is_active(today) { self.current } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn first_activity_starts_at_one() {
        let s = StreakState::default().record_activity(day("2024-05-01"));
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 1);
    }

    #[test]
    fn consecutive_days_extend_and_same_day_is_idempotent() {
        let s = StreakState::default()
            .record_activity(day("2024-05-01"))
            .record_activity(day("2024-05-01"))
            .record_activity(day("2024-05-02"))
            .record_activity(day("2024-05-03"));
        assert_eq!(s.current, 3);
        assert_eq!(s.longest, 3);
    }

    #[test]
    fn gap_resets_but_longest_is_kept() {
        let s = StreakState::default()
            .record_activity(day("2024-05-01"))
            .record_activity(day("2024-05-02"))
            .record_activity(day("2024-05-05"));
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 2);
    }

    #[test]
    fn crosses_month_boundaries() {
        let s = StreakState::default()
            .record_activity(day("2024-02-29"))
            .record_activity(day("2024-03-01"));
        assert_eq!(s.current, 2);
    }

    #[test]
    fn stale_dates_are_ignored() {
        let s = StreakState::default().record_activity(day("2024-05-03"));
        assert_eq!(s.record_activity(day("2024-05-01")), s);
    }

    #[test]
    fn activity_window() {
        let s = StreakState::default().record_activity(day("2024-05-01"));
        assert!(s.is_active(day("2024-05-01")));
        assert!(s.is_active(day("2024-05-02")));
        assert!(!s.is_active(day("2024-05-03")));
        assert_eq!(s.effective_current(day("2024-05-03")), 0);
    }
}
