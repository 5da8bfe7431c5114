//! Schedule text → cron translation for email programs.
//!
//! Creators type schedules like "every monday at 9am". We store the
//! equivalent five-field cron expression plus an IANA timezone, and compute
//! the next send time from those two columns.
//!
//! Only a small vocabulary is understood:
//!
//! - `every day at <time>` / `daily at <time>`
//! - `every <weekday> at <time>` (full name, plural, or three-letter abbreviation)
//! - `every weekday at <time>` (Mon–Fri) / `every weekend at <time>` (Sat, Sun)
//!
//! `<time>` is `9am`, `9:30pm`, `17`, or `17:45`.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static SCHEDULE_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(?:every (?P<day>[a-z]+)|daily) at (?P<hour>\d{1,2})(?::(?P<minute>\d{2}))? ?(?P<meridiem>am|pm)?$")
        .expect("schedule regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule is empty")]
    Empty,
    #[error("Unrecognised schedule \"{0}\" (try \"every monday at 9am\")")]
    Unrecognised(String),
    #[error("Unknown day \"{0}\"")]
    UnknownDay(String),
    #[error("Invalid time \"{0}\"")]
    InvalidTime(String),
    #[error("Unsupported cron expression \"{0}\"")]
    UnsupportedCron(String),
    #[error("Unknown timezone \"{0}\"")]
    UnknownTimezone(String),
}

// ============================================================
// Day sets
// ============================================================

/// A set of weekdays as a 7-bit mask. Bit 0 is Sunday, matching cron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub const EVERY_DAY: DaySet = DaySet(0b111_1111);
    pub const WEEKDAYS: DaySet = DaySet(0b011_1110);
    pub const WEEKEND: DaySet = DaySet(0b100_0001);

    pub fn single(day: Weekday) -> Self {
        DaySet(1 << day.num_days_from_sunday())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn with(self, cron_day: u32) -> Self {
        // cron allows 7 as a second spelling of Sunday
        DaySet(self.0 | (1 << (cron_day % 7)))
    }

    /// Render the day-of-week cron field: `*`, `1`, `1-5`, `0,6`, `1,3,5`.
    fn cron_field(&self) -> String {
        if *self == Self::EVERY_DAY {
            return "*".into();
        }

        let days: Vec<u32> = (0..7).filter(|d| self.0 & (1 << d) != 0).collect();
        let mut parts = Vec::new();
        let mut i = 0;
        while i < days.len() {
            let start = days[i];
            let mut end = start;
            while i + 1 < days.len() && days[i + 1] == end + 1 {
                i += 1;
                end = days[i];
            }
            match end - start {
                0 => parts.push(start.to_string()),
                1 => {
                    parts.push(start.to_string());
                    parts.push(end.to_string());
                }
                _ => parts.push(format!("{start}-{end}")),
            }
            i += 1;
        }
        parts.join(",")
    }
}

fn parse_day_word(word: &str) -> Result<DaySet, ScheduleError> {
    let set = match word {
        "day" => DaySet::EVERY_DAY,
        "weekday" | "weekdays" => DaySet::WEEKDAYS,
        "weekend" | "weekends" => DaySet::WEEKEND,
        other => {
            let singular = other.strip_suffix('s').filter(|w| w.ends_with("day")).unwrap_or(other);
            let day = match singular {
                "sunday" | "sun" => Weekday::Sun,
                "monday" | "mon" => Weekday::Mon,
                "tuesday" | "tue" => Weekday::Tue,
                "wednesday" | "wed" => Weekday::Wed,
                "thursday" | "thu" => Weekday::Thu,
                "friday" | "fri" => Weekday::Fri,
                "saturday" | "sat" => Weekday::Sat,
                _ => return Err(ScheduleError::UnknownDay(word.to_string())),
            };
            DaySet::single(day)
        }
    };
    Ok(set)
}

// ============================================================
// Cron schedule
// ============================================================

/// A fixed time of day on a set of weekdays — the only shape of schedule
/// email programs support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minute: u32,
    hour: u32,
    days: DaySet,
}

impl CronSchedule {
    pub fn new(hour: u32, minute: u32, days: DaySet) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTime(format!("{hour}:{minute:02}")));
        }
        if days.is_empty() {
            return Err(ScheduleError::UnknownDay(String::new()));
        }
        Ok(Self { minute, hour, days })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn days(&self) -> DaySet {
        self.days
    }

    /// Five-field cron expression, e.g. `0 9 * * 1`.
    pub fn to_cron(&self) -> String {
        format!("{} {} * * {}", self.minute, self.hour, self.days.cron_field())
    }

    /// Parse the cron subset produced by [`CronSchedule::to_cron`].
    pub fn from_cron(expr: &str) -> Result<Self, ScheduleError> {
        let unsupported = || ScheduleError::UnsupportedCron(expr.to_string());

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(unsupported());
        };
        if *dom != "*" || *month != "*" {
            return Err(unsupported());
        }

        let minute: u32 = minute.parse().map_err(|_| unsupported())?;
        let hour: u32 = hour.parse().map_err(|_| unsupported())?;

        let days = if *dow == "*" {
            DaySet::EVERY_DAY
        } else {
            let mut set = DaySet(0);
            for part in dow.split(',') {
                let (start, end) = match part.split_once('-') {
                    Some((a, b)) => (a, b),
                    None => (part, part),
                };
                let start: u32 = start.parse().map_err(|_| unsupported())?;
                let end: u32 = end.parse().map_err(|_| unsupported())?;
                if start > end || end > 7 {
                    return Err(unsupported());
                }
                for d in start..=end {
                    set = set.with(d);
                }
            }
            set
        };

        Self::new(hour, minute, days).map_err(|_| unsupported())
    }

    /// First instant strictly after `after` at which this schedule fires in `tz`.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earlier instant.
    /// Local times that do not exist (DST spring-forward) fire one hour later
    /// on the wall clock.
    pub fn next_run(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let start = after.with_timezone(&tz).date_naive();

        for offset in 0..=8 {
            let date = start + Duration::days(offset);
            if !self.days.contains(date.weekday()) {
                continue;
            }

            let naive = date.and_time(time);
            let local = match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => dt,
                LocalResult::Ambiguous(earliest, _) => earliest,
                LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
                    LocalResult::None => continue,
                },
            };

            let candidate = local.with_timezone(&Utc);
            if candidate > after {
                return Some(candidate);
            }
        }

        None
    }

    /// The next `count` fire times after `after`, capped at [`MAX_UPCOMING_RUNS`].
    pub fn upcoming(&self, after: DateTime<Utc>, tz: Tz, count: usize) -> Vec<DateTime<Utc>> {
        let count = count.min(MAX_UPCOMING_RUNS);
        let mut runs = Vec::with_capacity(count);
        let mut cursor = after;
        while runs.len() < count {
            let Some(next) = self.next_run(cursor, tz) else { break };
            runs.push(next);
            cursor = next;
        }
        runs
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = match self.days {
            DaySet::EVERY_DAY => "every day".to_string(),
            DaySet::WEEKDAYS => "every weekday".to_string(),
            DaySet::WEEKEND => "every weekend".to_string(),
            set => {
                let names: Vec<&str> = [
                    Weekday::Sun,
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                    Weekday::Sat,
                ]
                .into_iter()
                .filter(|d| set.contains(*d))
                .map(weekday_name)
                .collect();
                format!("every {}", names.join(", "))
            }
        };
        write!(f, "{days} at {:02}:{:02}", self.hour, self.minute)
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

// ============================================================
// Parsing
// ============================================================

/// Translate a natural-language schedule into a [`CronSchedule`].
pub fn parse_schedule(text: &str) -> Result<CronSchedule, ScheduleError> {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if normalized.is_empty() {
        return Err(ScheduleError::Empty);
    }

    let caps = SCHEDULE_REGEX
        .captures(&normalized)
        .ok_or_else(|| ScheduleError::Unrecognised(text.trim().to_string()))?;

    let days = match caps.name("day") {
        Some(word) => parse_day_word(word.as_str())?,
        None => DaySet::EVERY_DAY,
    };

    let invalid_time = || ScheduleError::InvalidTime(text.trim().to_string());
    let raw_hour: u32 = caps["hour"].parse().map_err(|_| invalid_time())?;
    let minute: u32 = match caps.name("minute") {
        Some(m) => m.as_str().parse().map_err(|_| invalid_time())?,
        None => 0,
    };

    let hour = match caps.name("meridiem").map(|m| m.as_str()) {
        Some(meridiem) => {
            if !(1..=12).contains(&raw_hour) {
                return Err(invalid_time());
            }
            match (meridiem, raw_hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => raw_hour,
    };

    CronSchedule::new(hour, minute, days).map_err(|_| invalid_time())
}

/// Resolve an IANA timezone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

/// Preview payload returned to clients composing a schedule.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulePreview {
    pub cron: String,
    pub description: String,
    pub timezone: String,
    pub next_runs: Vec<DateTime<Utc>>,
}

/// Longest list of fire times a single preview returns.
pub const MAX_UPCOMING_RUNS: usize = 100;

/// Parse `text`, then list the next `count` fire times in `timezone`.
pub fn preview(
    text: &str,
    timezone: &str,
    now: DateTime<Utc>,
    count: usize,
) -> Result<SchedulePreview, ScheduleError> {
    let schedule = parse_schedule(text)?;
    let tz = parse_timezone(timezone)?;
    Ok(SchedulePreview {
        cron: schedule.to_cron(),
        description: schedule.to_string(),
        timezone: tz.name().to_string(),
        next_runs: schedule.upcoming(now, tz, count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn cron(text: &str) -> String {
        parse_schedule(text).unwrap().to_cron()
    }

    #[test]
    fn weekday_phrases_map_to_cron() {
        assert_eq!(cron("every monday at 9am"), "0 9 * * 1");
        assert_eq!(cron("every Sunday at 10am"), "0 10 * * 0");
        assert_eq!(cron("every sat at 8pm"), "0 20 * * 6");
        assert_eq!(cron("every Fridays at 5:30pm"), "30 17 * * 5");
    }

    #[test]
    fn daily_phrases_map_to_cron() {
        assert_eq!(cron("every day at 5pm"), "0 17 * * *");
        assert_eq!(cron("daily at 7:15am"), "15 7 * * *");
        assert_eq!(cron("  Every   DAY  at  9 AM "), "0 9 * * *");
    }

    #[test]
    fn weekday_and_weekend_groups() {
        assert_eq!(cron("every weekday at 8am"), "0 8 * * 1-5");
        assert_eq!(cron("every weekend at 11am"), "0 11 * * 0,6");
    }

    #[test]
    fn twelve_oclock_edges() {
        let midnight = parse_schedule("every day at 12am").unwrap();
        assert_eq!(midnight.hour(), 0);
        let noon = parse_schedule("every day at 12pm").unwrap();
        assert_eq!(noon.hour(), 12);
    }

    #[test]
    fn twenty_four_hour_times() {
        assert_eq!(cron("every tuesday at 17"), "0 17 * * 2");
        assert_eq!(cron("every tuesday at 0:05"), "5 0 * * 2");
    }

    #[test]
    fn rejects_out_of_range_and_unknown_input() {
        assert_eq!(parse_schedule("   "), Err(ScheduleError::Empty));
        assert!(matches!(parse_schedule("every day at 13pm"), Err(ScheduleError::InvalidTime(_))));
        assert!(matches!(parse_schedule("every day at 0am"), Err(ScheduleError::InvalidTime(_))));
        assert!(matches!(parse_schedule("every day at 24"), Err(ScheduleError::InvalidTime(_))));
        assert!(matches!(parse_schedule("every day at 9:75am"), Err(ScheduleError::InvalidTime(_))));
        assert!(matches!(parse_schedule("every funday at 9am"), Err(ScheduleError::UnknownDay(_))));
        assert!(matches!(parse_schedule("twice a week"), Err(ScheduleError::Unrecognised(_))));
    }

    #[test]
    fn cron_round_trips_through_storage_form() {
        for text in [
            "every monday at 9am",
            "every day at 5pm",
            "every weekday at 8:45am",
            "every weekend at 11am",
            "every thursday at 23:59",
        ] {
            let schedule = parse_schedule(text).unwrap();
            assert_eq!(CronSchedule::from_cron(&schedule.to_cron()).unwrap(), schedule, "{text}");
        }
    }

    #[test]
    fn from_cron_accepts_lists_ranges_and_sunday_seven() {
        let s = CronSchedule::from_cron("0 9 * * 1,3,5").unwrap();
        assert!(s.days().contains(Weekday::Wed));
        assert!(!s.days().contains(Weekday::Tue));

        let sunday = CronSchedule::from_cron("0 9 * * 7").unwrap();
        assert_eq!(sunday.days(), DaySet::single(Weekday::Sun));
        assert_eq!(sunday.to_cron(), "0 9 * * 0");
    }

    #[test]
    fn from_cron_rejects_unsupported_fields() {
        for expr in ["0 9 1 * *", "*/5 * * * *", "0 9 * * 8", "0 9 * *", "0 9 * * 5-1", "60 9 * * *"] {
            assert!(CronSchedule::from_cron(expr).is_err(), "{expr}");
        }
    }

    #[test]
    fn next_run_later_same_day() {
        let s = parse_schedule("every day at 5pm").unwrap();
        let next = s.next_run(utc("2024-05-01T09:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2024-05-01T17:00:00Z"));
    }

    #[test]
    fn next_run_is_strictly_after() {
        let s = parse_schedule("every day at 5pm").unwrap();
        let next = s.next_run(utc("2024-05-01T17:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2024-05-02T17:00:00Z"));
    }

    #[test]
    fn next_run_skips_to_matching_weekday() {
        // 2024-05-01 is a Wednesday
        let s = parse_schedule("every monday at 9am").unwrap();
        let next = s.next_run(utc("2024-05-01T12:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2024-05-06T09:00:00Z"));

        // Monday after the slot already passed → the following Monday
        let next = s.next_run(utc("2024-05-06T10:00:00Z"), Tz::UTC).unwrap();
        assert_eq!(next, utc("2024-05-13T09:00:00Z"));
    }

    #[test]
    fn next_run_respects_timezone() {
        // 2024-01-01T00:00Z is still Sunday evening in New York
        let s = parse_schedule("every monday at 9am").unwrap();
        let tz = parse_timezone("America/New_York").unwrap();
        let next = s.next_run(utc("2024-01-01T00:00:00Z"), tz).unwrap();
        assert_eq!(next, utc("2024-01-01T14:00:00Z"));
    }

    #[test]
    fn next_run_in_spring_forward_gap_shifts_an_hour() {
        // 2:30am does not exist in New York on 2024-03-10
        let s = parse_schedule("every day at 2:30am").unwrap();
        let tz = parse_timezone("America/New_York").unwrap();
        let next = s.next_run(utc("2024-03-10T05:00:00Z"), tz).unwrap();
        assert_eq!(next, utc("2024-03-10T07:30:00Z"));
    }

    #[test]
    fn next_run_in_fall_back_overlap_takes_earlier() {
        let s = parse_schedule("every day at 1:30am").unwrap();
        let tz = parse_timezone("America/New_York").unwrap();
        let next = s.next_run(utc("2024-11-03T04:00:00Z"), tz).unwrap();
        assert_eq!(next, utc("2024-11-03T05:30:00Z"));
    }

    #[test]
    fn upcoming_caps_huge_counts() {
        let s = parse_schedule("every day at 9am").unwrap();
        let runs = s.upcoming(utc("2024-05-01T10:00:00Z"), Tz::UTC, usize::MAX);
        assert_eq!(runs.len(), MAX_UPCOMING_RUNS);
        assert_eq!(runs[0], utc("2024-05-02T09:00:00Z"));
    }

    #[test]
    fn upcoming_lists_consecutive_runs() {
        let s = parse_schedule("every weekday at 8am").unwrap();
        // Friday 2024-05-03 after the slot
        let runs = s.upcoming(utc("2024-05-03T09:00:00Z"), Tz::UTC, 3);
        assert_eq!(
            runs,
            vec![
                utc("2024-05-06T08:00:00Z"),
                utc("2024-05-07T08:00:00Z"),
                utc("2024-05-08T08:00:00Z"),
            ]
        );
    }

    #[test]
    fn description_reads_naturally() {
        assert_eq!(parse_schedule("every monday at 9am").unwrap().to_string(), "every Monday at 09:00");
        assert_eq!(parse_schedule("daily at 5:05pm").unwrap().to_string(), "every day at 17:05");
    }

    #[test]
    fn timezone_names() {
        assert!(parse_timezone("Europe/Berlin").is_ok());
        assert!(matches!(parse_timezone("Mars/Olympus"), Err(ScheduleError::UnknownTimezone(_))));
    }

    #[test]
    fn preview_combines_everything() {
        let p = preview("every day at 9am", "UTC", utc("2024-05-01T10:00:00Z"), 2).unwrap();
        assert_eq!(p.cron, "0 9 * * *");
        assert_eq!(p.timezone, "UTC");
        assert_eq!(p.next_runs.len(), 2);
        assert_eq!(p.next_runs[0], utc("2024-05-02T09:00:00Z"));
    }
}
