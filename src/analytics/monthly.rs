//! Monthly rollups and running balances.

use crate::error::MalformedDate;
use crate::types::{Transaction, TransactionKind};
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A calendar month. Orders by year, then month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// `month` is 1-based. Returns None outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// Display label such as `Jan 2024`.
    pub fn label(self) -> String {
        format!("{} {}", MONTH_ABBREVIATIONS[(self.month - 1) as usize], self.year)
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Income and expense totals for one month.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotals {
    pub month: YearMonth,
    pub month_label: String,
    pub income_total: f64,
    pub expense_total: f64,
}

impl MonthlyTotals {
    fn empty(month: YearMonth) -> Self {
        Self {
            month,
            month_label: month.label(),
            income_total: 0.0,
            expense_total: 0.0,
        }
    }

    /// Income minus expenses.
    pub fn net(&self) -> f64 {
        self.income_total - self.expense_total
    }
}

#[derive(Clone, Debug, Default)]
pub struct MonthlyRollup {
    /// One entry per month with activity, oldest first.
    pub months: Vec<MonthlyTotals>,
    pub skipped: Vec<MalformedDate>,
}

/// Bucket transactions by the calendar month of their date.
///
/// Months without any transaction are not filled in.
pub fn monthly_rollup<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> MonthlyRollup {
    let mut buckets: BTreeMap<YearMonth, MonthlyTotals> = BTreeMap::new();
    let mut skipped = Vec::new();

    for tx in transactions {
        let date = match tx.calendar_date() {
            Ok(date) => date,
            Err(malformed) => {
                warn!(
                    id = %malformed.id,
                    value = %malformed.value,
                    "Leaving transaction out of monthly rollup"
                );
                skipped.push(malformed);
                continue;
            }
        };

        let month = YearMonth::of(date);
        let totals = buckets
            .entry(month)
            .or_insert_with(|| MonthlyTotals::empty(month));
        match tx.kind {
            TransactionKind::Income => totals.income_total += tx.amount,
            TransactionKind::Expense => totals.expense_total += tx.amount,
        }
    }

    MonthlyRollup {
        months: buckets.into_values().collect(),
        skipped,
    }
}

/// Balance at the end of a month.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePoint {
    pub month: YearMonth,
    pub month_label: String,
    pub balance: f64,
}

/// Accumulate each month's net onto `opening`.
pub fn running_balance(months: &[MonthlyTotals], opening: f64) -> Vec<BalancePoint> {
    let mut balance = opening;

    months
        .iter()
        .map(|totals| {
            balance += totals.net();
            BalancePoint {
                month: totals.month,
                month_label: totals.month_label.clone(),
                balance,
            }
        })
        .collect()
}
