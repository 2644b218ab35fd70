//! Date ranges and range filtering.

use crate::error::MalformedDate;
use crate::types::Transaction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::YearMonth;

/// An inclusive range of calendar dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Every representable date.
    pub fn unbounded() -> Self {
        Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        }
    }

    /// First to last day of a month.
    pub fn month(month: YearMonth) -> Self {
        Self {
            start: month.first_day(),
            end: month.last_day(),
        }
    }

    /// Both bounds inclusive. A range whose start is after its end is empty.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Transactions that fell in a range, plus those whose date could not be read.
#[derive(Clone, Debug, Default)]
pub struct RangeFilter<'a> {
    pub transactions: Vec<&'a Transaction>,
    pub skipped: Vec<MalformedDate>,
}

impl<'a> RangeFilter<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.transactions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Keep transactions whose calendar date lies in `range`, in input order.
///
/// Only `date` is considered, never the audit timestamps. A date-time keeps
/// its calendar day, so `2024-01-31T23:59:00` is inside a range ending on
/// the 31st.
pub fn filter_by_range<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    range: &DateRange,
) -> RangeFilter<'a> {
    let mut filtered = RangeFilter::default();

    for tx in transactions {
        match tx.calendar_date() {
            Ok(date) if range.contains(date) => filtered.transactions.push(tx),
            Ok(_) => {}
            Err(malformed) => {
                warn!(
                    id = %malformed.id,
                    value = %malformed.value,
                    "Skipping transaction with malformed date"
                );
                filtered.skipped.push(malformed);
            }
        }
    }

    filtered
}
