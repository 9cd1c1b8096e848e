use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule must keep at least one allowed day")]
    Empty,

    #[error("day {0} is outside 1..=31")]
    DayOutOfRange(u8),
}

/// Admin-configured set of calendar days (1..=31) on which organizers may
/// submit withdrawal requests. A configured day past the end of a short
/// month clamps to that month's last day, in both [`Self::is_open`] and
/// [`Self::next_open_date`], so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSchedule {
    allowed_days: BTreeSet<u8>,
}

impl WithdrawalSchedule {
    /// Validates range and non-emptiness. The non-empty rule used to live
    /// only in the admin UI; here it is enforced at construction so an
    /// empty schedule cannot be stored at all.
    pub fn new(days: impl IntoIterator<Item = u8>) -> Result<Self, ScheduleError> {
        let allowed_days: BTreeSet<u8> = days.into_iter().collect();

        if let Some(&day) = allowed_days.iter().find(|&&day| day == 0 || day > 31) {
            return Err(ScheduleError::DayOutOfRange(day));
        }
        if allowed_days.is_empty() {
            return Err(ScheduleError::Empty);
        }

        Ok(Self { allowed_days })
    }

    pub fn allowed_days(&self) -> Vec<u8> {
        self.allowed_days.iter().copied().collect()
    }

    pub fn is_open(&self, today: NaiveDate) -> bool {
        let last_day = days_in_month(today.year(), today.month());
        self.allowed_days
            .iter()
            .any(|&day| u32::from(day).min(last_day) == today.day())
    }

    /// Earliest open date not before `today`: the first allowed day
    /// >= today's day-of-month within the current month, else the smallest
    /// allowed day next month.
    pub fn next_open_date(&self, today: NaiveDate) -> NaiveDate {
        let last_day = days_in_month(today.year(), today.month());
        for &day in &self.allowed_days {
            let day = u32::from(day).min(last_day);
            if day >= today.day() {
                return date_or_today(today.year(), today.month(), day, today);
            }
        }

        let (year, month) = next_month(today.year(), today.month());
        // new() guarantees the set is non-empty
        let first = u32::from(*self.allowed_days.iter().next().unwrap_or(&1));
        let day = first.min(days_in_month(year, month));
        date_or_today(year, month, day, today)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = next_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn date_or_today(year: i32, month: u32, day: u32, today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(days: &[u8]) -> WithdrawalSchedule {
        WithdrawalSchedule::new(days.iter().copied()).unwrap()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn empty_schedule_is_rejected() {
        assert_eq!(WithdrawalSchedule::new([]), Err(ScheduleError::Empty));
    }

    #[test]
    fn out_of_range_days_are_rejected() {
        assert_eq!(
            WithdrawalSchedule::new([5, 0]),
            Err(ScheduleError::DayOutOfRange(0))
        );
        assert_eq!(
            WithdrawalSchedule::new([32]),
            Err(ScheduleError::DayOutOfRange(32))
        );
    }

    #[test]
    fn open_exactly_on_configured_days() {
        let schedule = schedule(&[5, 15, 25]);
        for day in 1..=31 {
            let today = date(2025, 3, day);
            assert_eq!(
                schedule.is_open(today),
                [5, 15, 25].contains(&day),
                "day {day}"
            );
        }
    }

    #[test]
    fn next_open_date_within_current_month() {
        let schedule = schedule(&[5, 15, 25]);
        assert_eq!(schedule.next_open_date(date(2025, 3, 20)), date(2025, 3, 25));
    }

    #[test]
    fn next_open_date_rolls_to_next_month() {
        let schedule = schedule(&[5, 15, 25]);
        assert_eq!(schedule.next_open_date(date(2025, 3, 26)), date(2025, 4, 5));
    }

    #[test]
    fn today_counts_as_open() {
        let schedule = schedule(&[5, 15, 25]);
        assert_eq!(schedule.next_open_date(date(2025, 3, 5)), date(2025, 3, 5));
    }

    #[test]
    fn december_rolls_to_january() {
        let schedule = schedule(&[10]);
        assert_eq!(
            schedule.next_open_date(date(2025, 12, 11)),
            date(2026, 1, 10)
        );
    }

    #[test]
    fn day_31_clamps_to_short_month_end() {
        let schedule = schedule(&[31]);

        // April has 30 days: the configured 31st clamps to the 30th.
        assert!(schedule.is_open(date(2025, 4, 30)));
        assert!(!schedule.is_open(date(2025, 4, 29)));
        assert_eq!(schedule.next_open_date(date(2025, 4, 20)), date(2025, 4, 30));
    }

    #[test]
    fn day_30_clamps_in_february() {
        let schedule = schedule(&[30]);
        assert!(schedule.is_open(date(2025, 2, 28)));
        assert_eq!(schedule.next_open_date(date(2025, 2, 1)), date(2025, 2, 28));
        // leap year
        assert!(schedule.is_open(date(2024, 2, 29)));
        assert!(!schedule.is_open(date(2024, 2, 28)));
    }
}
