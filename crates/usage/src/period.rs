//! Billing period window: the calendar month one run processes.
//!
//! A window is always calendar-month aligned. It is derived either from an
//! explicit month offset (months back from the current month) or, in
//! "continue" mode, from the issue date of the most recent existing order.

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voipbill_core::{DomainError, DomainResult};

use crate::record::UsageRecord;

/// Offset used when nothing else is known: last month.
pub const DEFAULT_MONTH_OFFSET: i32 = -1;

/// How the processed month is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelector {
    /// Explicit offset; `None` means [`DEFAULT_MONTH_OFFSET`].
    Offset(Option<i32>),
    /// Continue after the most recent existing order, if any.
    Continue { last_order: Option<NaiveDate> },
}

/// Resolved `since`/`until` bounds (inclusive) of one processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    month_offset: i32,
    since: NaiveDate,
    until: NaiveDate,
}

/// Result of filtering fetched usage records through a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodFilter {
    /// Records whose start date falls into the window's month.
    pub kept: Vec<UsageRecord>,
    /// Records that start in another month (provider over-fetch).
    pub outside: usize,
    /// Records without a usable start date.
    pub undated: Vec<UsageRecord>,
}

/// Force an offset to point backwards (`3` is read as `-3`).
pub fn normalize_offset(offset: i32) -> i32 {
    if offset > 0 { -offset } else { offset }
}

/// Offset that continues after the most recent order.
///
/// Never less negative than `-1`: the current month is still open.
pub fn continue_offset(last_order: Option<NaiveDate>, today: NaiveDate) -> i32 {
    match last_order {
        None => DEFAULT_MONTH_OFFSET,
        Some(last) => {
            let months = (today.year() - last.year()) * 12
                + (today.month() as i32 - last.month() as i32);
            (-months).min(DEFAULT_MONTH_OFFSET)
        }
    }
}

impl PeriodWindow {
    /// Resolve a window relative to `today`.
    pub fn resolve(selector: PeriodSelector, today: NaiveDate) -> DomainResult<Self> {
        let offset = match selector {
            PeriodSelector::Offset(explicit) => {
                normalize_offset(explicit.unwrap_or(DEFAULT_MONTH_OFFSET))
            }
            PeriodSelector::Continue { last_order } => {
                let offset = continue_offset(last_order, today);
                debug!(?last_order, offset, "continuing after last order");
                offset
            }
        };
        Self::for_month_offset(offset, today)
    }

    /// Calendar month `offset` months away from the month of `today`.
    pub fn for_month_offset(offset: i32, today: NaiveDate) -> DomainResult<Self> {
        let offset = normalize_offset(offset);
        let first_of_current = today - Duration::days(i64::from(today.day0()));

        let since = first_of_current
            .checked_sub_months(Months::new(offset.unsigned_abs()))
            .ok_or_else(|| DomainError::invalid_period(format!("month offset {offset} out of range")))?;
        let until = since
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| DomainError::invalid_period(format!("month offset {offset} out of range")))?;

        Ok(Self {
            month_offset: offset,
            since,
            until,
        })
    }

    pub fn month_offset(&self) -> i32 {
        self.month_offset
    }

    pub fn since(&self) -> NaiveDate {
        self.since
    }

    pub fn until(&self) -> NaiveDate {
        self.until
    }

    /// `(year, month)` match against the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.since.year() && date.month() == self.since.month()
    }

    /// Keep only records that start inside the window.
    ///
    /// The provider paginates by offset and may return neighbouring months.
    pub fn filter(&self, records: Vec<UsageRecord>) -> PeriodFilter {
        let mut result = PeriodFilter::default();

        for record in records {
            match record.start_date() {
                Some(start) if self.contains(start) => result.kept.push(record),
                Some(start) => {
                    debug!(
                        customer = %record.customer_external_code,
                        %start,
                        "usage record outside of processed period"
                    );
                    result.outside += 1;
                }
                None => {
                    warn!(
                        customer = %record.customer_external_code,
                        "usage record without start date"
                    );
                    result.undated.push(record);
                }
            }
        }

        result
    }

    /// Period a record covers, repaired against the window.
    ///
    /// A missing end, or an end before the start, is replaced by `until`.
    pub fn record_period(&self, record: &UsageRecord) -> Option<(NaiveDate, NaiveDate)> {
        let start = record.start_date()?;
        let end = match record.end_date() {
            Some(end) if end >= start => end,
            _ => self.until,
        };
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(raw: &str) -> Option<DateTime<FixedOffset>> {
        Some(DateTime::parse_from_rfc3339(raw).unwrap())
    }

    fn record(code: &str, start: Option<DateTime<FixedOffset>>) -> UsageRecord {
        UsageRecord {
            customer_external_code: code.to_string(),
            ipex_customer_id: Some(1),
            customer_name: code.to_string(),
            price: Decimal::ONE,
            period_start: start,
            period_end: None,
            note: String::new(),
            street: String::new(),
            city: String::new(),
            zip_code: String::new(),
        }
    }

    #[test]
    fn default_offset_is_last_calendar_month() {
        let window = PeriodWindow::resolve(PeriodSelector::Offset(None), date(2024, 3, 15)).unwrap();
        assert_eq!(window.month_offset(), -1);
        assert_eq!(window.since(), date(2024, 2, 1));
        assert_eq!(window.until(), date(2024, 2, 29));
    }

    #[test]
    fn positive_offset_is_forced_negative() {
        let window = PeriodWindow::for_month_offset(2, date(2024, 1, 10)).unwrap();
        assert_eq!(window.month_offset(), -2);
        assert_eq!(window.since(), date(2023, 11, 1));
        assert_eq!(window.until(), date(2023, 11, 30));
    }

    #[test]
    fn continue_mode_counts_months_since_last_order() {
        let today = date(2024, 6, 3);
        assert_eq!(continue_offset(Some(date(2024, 3, 28)), today), -3);
        assert_eq!(continue_offset(Some(date(2023, 12, 1)), today), -6);
    }

    #[test]
    fn continue_mode_defaults_and_clamps_to_last_month() {
        let today = date(2024, 6, 3);
        assert_eq!(continue_offset(None, today), -1);
        assert_eq!(continue_offset(Some(date(2024, 6, 1)), today), -1);
        assert_eq!(continue_offset(Some(date(2024, 8, 1)), today), -1);

        let window = PeriodWindow::resolve(
            PeriodSelector::Continue {
                last_order: Some(date(2024, 3, 28)),
            },
            today,
        )
        .unwrap();
        assert_eq!(window.since(), date(2024, 3, 1));
        assert_eq!(window.until(), date(2024, 3, 31));
    }

    #[test]
    fn filter_keeps_only_the_selected_month() {
        let window = PeriodWindow::for_month_offset(-2, date(2024, 6, 10)).unwrap();
        let records = vec![
            record("MAR", at("2024-03-01T00:00:00+01:00")),
            record("APR", at("2024-04-01T00:00:00+02:00")),
            record("MAY", at("2024-05-01T00:00:00+02:00")),
            record("NONE", None),
        ];

        let filtered = window.filter(records);
        let kept: Vec<_> = filtered
            .kept
            .iter()
            .map(|r| r.customer_external_code.as_str())
            .collect();
        assert_eq!(kept, vec!["APR"]);
        assert_eq!(filtered.outside, 2);
        assert_eq!(filtered.undated.len(), 1);
    }

    #[test]
    fn filter_uses_the_records_own_offset() {
        // Midnight local on the 1st is still the previous month in UTC.
        let window = PeriodWindow::for_month_offset(-1, date(2024, 6, 10)).unwrap();
        let filtered = window.filter(vec![record("A", at("2024-05-01T00:00:00+02:00"))]);
        assert_eq!(filtered.kept.len(), 1);
    }

    #[test]
    fn record_period_repairs_missing_or_inverted_end() {
        let window = PeriodWindow::for_month_offset(-1, date(2024, 6, 10)).unwrap();

        let mut r = record("A", at("2024-05-01T00:00:00+02:00"));
        assert_eq!(
            window.record_period(&r),
            Some((date(2024, 5, 1), date(2024, 5, 31)))
        );

        r.period_end = at("2024-04-15T00:00:00+02:00");
        assert_eq!(
            window.record_period(&r),
            Some((date(2024, 5, 1), date(2024, 5, 31)))
        );

        r.period_end = at("2024-05-20T00:00:00+02:00");
        assert_eq!(
            window.record_period(&r),
            Some((date(2024, 5, 1), date(2024, 5, 20)))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every window is exactly one calendar month in the past
        /// (or the current month for offset 0).
        #[test]
        fn windows_are_calendar_months(
            offset in -240i32..=240,
            days in 0i64..20_000,
        ) {
            let today = date(2000, 1, 1) + Duration::days(days);
            let window = PeriodWindow::for_month_offset(offset, today).unwrap();

            prop_assert!(window.month_offset() <= 0);
            prop_assert_eq!(window.since().day(), 1);
            prop_assert!(window.since() <= window.until());
            prop_assert_eq!(window.until().succ_opt().unwrap().day(), 1);
            prop_assert!(window.contains(window.until()));
            prop_assert!(window.since() <= today);
        }

        /// Property: continue mode never selects the current month.
        #[test]
        fn continue_offset_never_reaches_current_month(
            last_days in 0i64..20_000,
            today_days in 0i64..20_000,
        ) {
            let last = date(2000, 1, 1) + Duration::days(last_days);
            let today = date(2000, 1, 1) + Duration::days(today_days);
            prop_assert!(continue_offset(Some(last), today) <= -1);
        }
    }
}
