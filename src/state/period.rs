//! Period arithmetic for daily and monthly ingestion
//!
//! A period is identified by a single date: the day itself for daily runs,
//! the first of the month for monthly runs.

use chrono::{Datelike, Days, Months, NaiveDate};
use std::fmt;

/// Size of one ingestion period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Granularity {
    /// One request per station chunk per day
    Daily,
    /// One request per station chunk per month (first of the month)
    Monthly,
}

impl Granularity {
    /// Snaps a date onto the period it belongs to
    pub fn snap(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Monthly => month_start(date),
        }
    }

    /// Returns the period following `period`
    pub fn next(&self, period: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => period.checked_add_days(Days::new(1)),
            Self::Monthly => month_start(period).checked_add_months(Months::new(1)),
        }
    }

    /// Returns the most recent complete period before `today`
    ///
    /// Yesterday for daily runs, the first day of last month for monthly runs.
    pub fn previous(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => today.pred_opt().unwrap_or(today),
            Self::Monthly => {
                let this_month = month_start(today);
                month_start(this_month.pred_opt().unwrap_or(this_month))
            }
        }
    }

    /// Returns the ordered, inclusive list of periods between `start` and `end`
    ///
    /// Both endpoints are snapped first. An inverted range yields no periods.
    pub fn periods(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let end = self.snap(end);
        let mut current = Some(self.snap(start));
        let mut periods = Vec::new();

        while let Some(period) = current {
            if period > end {
                break;
            }
            periods.push(period);
            current = self.next(period);
        }

        periods
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        };
        write!(f, "{}", s)
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_daily_periods_inclusive() {
        let periods = Granularity::Daily.periods(d(2024, 2, 27), d(2024, 3, 1));
        assert_eq!(
            periods,
            vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]
        );
    }

    #[test]
    fn test_monthly_periods_snap_to_month_start() {
        let periods = Granularity::Monthly.periods(d(2023, 11, 15), d(2024, 2, 3));
        assert_eq!(
            periods,
            vec![d(2023, 11, 1), d(2023, 12, 1), d(2024, 1, 1), d(2024, 2, 1)]
        );
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(Granularity::Daily
            .periods(d(2024, 3, 2), d(2024, 3, 1))
            .is_empty());
    }

    #[test]
    fn test_single_period_range() {
        assert_eq!(
            Granularity::Monthly.periods(d(2024, 5, 20), d(2024, 5, 2)),
            vec![d(2024, 5, 1)]
        );
    }

    #[test]
    fn test_previous_period() {
        assert_eq!(Granularity::Daily.previous(d(2024, 3, 1)), d(2024, 2, 29));
        assert_eq!(Granularity::Monthly.previous(d(2024, 1, 1)), d(2023, 12, 1));
        assert_eq!(Granularity::Monthly.previous(d(2024, 10, 31)), d(2024, 9, 1));
    }

    #[test]
    fn test_display() {
        assert_eq!(Granularity::Daily.to_string(), "daily");
        assert_eq!(Granularity::Monthly.to_string(), "monthly");
    }
}
