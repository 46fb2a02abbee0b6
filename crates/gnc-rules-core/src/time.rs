//! Calendar-month filtering of transactions

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::error::{CoreError, CoreResult};
use crate::models::Transaction;

/// Half-open range covering one calendar month:
/// `[first day 00:00, first day of next month 00:00)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    year: i32,
    month: u32,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidPeriod { year, month };
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?;
        let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?;

        Ok(Self { year, month, start, end })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First instant of the month (inclusive)
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// First instant of the next month (exclusive)
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, at: &NaiveDateTime) -> bool {
        *at >= self.start && *at < self.end
    }
}

impl std::fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Time filtering trait
pub trait TimeFilter {
    /// Check whether the item falls inside the period, read in `tz`
    fn filter_by_time_in<Tz: TimeZone>(&self, period: &MonthPeriod, tz: &Tz) -> bool;

    /// Check whether the item falls inside the period in local time
    fn filter_by_time(&self, period: &MonthPeriod) -> bool {
        self.filter_by_time_in(period, &Local)
    }
}

impl TimeFilter for Transaction {
    fn filter_by_time_in<Tz: TimeZone>(&self, period: &MonthPeriod, tz: &Tz) -> bool {
        // Unposted transactions never fall inside a month
        self.post_date_in(tz).map_or(false, |date| period.contains(&date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    #[test]
    fn test_month_boundaries() {
        let period = MonthPeriod::new(2026, 3).unwrap();
        assert_eq!(period.start(), at(2026, 3, 1, 0, 0, 0));
        assert_eq!(period.end(), at(2026, 4, 1, 0, 0, 0));

        assert!(period.contains(&at(2026, 3, 1, 0, 0, 0)));
        assert!(period.contains(&at(2026, 3, 31, 23, 59, 59)));
        assert!(!period.contains(&at(2026, 4, 1, 0, 0, 0)));
        assert!(!period.contains(&at(2026, 2, 28, 23, 59, 59)));
    }

    #[test]
    fn test_december_rolls_into_next_year() {
        let period = MonthPeriod::new(2025, 12).unwrap();
        assert_eq!(period.end(), at(2026, 1, 1, 0, 0, 0));
        assert!(period.contains(&at(2025, 12, 31, 10, 59, 0)));
        assert!(!period.contains(&at(2026, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_invalid_month() {
        assert!(matches!(MonthPeriod::new(2026, 0), Err(CoreError::InvalidPeriod { .. })));
        assert!(matches!(MonthPeriod::new(2026, 13), Err(CoreError::InvalidPeriod { .. })));
    }

    fn posted_at(post_date: Option<NaiveDateTime>) -> Transaction {
        Transaction {
            guid: "t1".to_string(),
            currency: crate::types::CommodityId(0),
            num: String::new(),
            post_date,
            enter_date: None,
            description: "LATE NIGHT".to_string(),
            splits: Vec::new(),
        }
    }

    #[test]
    fn test_month_is_read_in_the_given_zone() {
        let txn = posted_at(Some(at(2026, 3, 31, 23, 30, 0)));
        let march = MonthPeriod::new(2026, 3).unwrap();
        let april = MonthPeriod::new(2026, 4).unwrap();

        let utc = FixedOffset::east_opt(0).unwrap();
        assert!(txn.filter_by_time_in(&march, &utc));

        let paris = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(txn.post_date_in(&paris), Some(at(2026, 4, 1, 1, 30, 0)));
        assert!(!txn.filter_by_time_in(&march, &paris));
        assert!(txn.filter_by_time_in(&april, &paris));

        let new_york = FixedOffset::west_opt(4 * 3600).unwrap();
        assert!(txn.filter_by_time_in(&march, &new_york));
        assert!(!txn.filter_by_time_in(&april, &new_york));
    }

    #[test]
    fn test_unposted_transaction_is_outside_every_month() {
        let txn = posted_at(None);
        let march = MonthPeriod::new(2026, 3).unwrap();
        assert!(!txn.filter_by_time(&march));
        assert!(!txn.filter_by_time_in(&march, &FixedOffset::east_opt(0).unwrap()));
    }

    #[test]
    fn test_display() {
        assert_eq!(MonthPeriod::new(2026, 3).unwrap().to_string(), "2026-03");
    }
}
