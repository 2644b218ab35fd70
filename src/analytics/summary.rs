//! Dashboard summary over a date range.

use crate::error::MalformedDate;
use crate::types::{Transaction, TransactionKind};
use serde::Serialize;
use tracing::debug;

use super::category::{category_breakdown, CategoryShare};
use super::monthly::{monthly_rollup, running_balance, BalancePoint, MonthlyTotals};
use super::range::{filter_by_range, DateRange};
use super::totals::{balance, highest_expense, total};

/// Everything the dashboard shows for one date range.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub range: DateRange,
    pub monthly: Vec<MonthlyTotals>,
    pub categories: Vec<CategoryShare>,
    pub balance: f64,
    pub income_total: f64,
    pub expense_total: f64,
    /// Month-end balances, starting from everything dated before the range.
    pub running_balance: Vec<BalancePoint>,
    pub highest_expense: Option<Transaction>,
    pub transaction_count: usize,
    /// Records left out because their date could not be read.
    pub skipped: Vec<MalformedDate>,
}

impl Summary {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Compute every aggregate over the transactions in `range`.
pub fn summarize<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    range: &DateRange,
) -> Summary {
    let all: Vec<&Transaction> = transactions.into_iter().collect();
    let filtered = filter_by_range(all.iter().copied(), range);

    let opening = balance(all.iter().copied().filter(|tx| {
        tx.calendar_date()
            .map(|date| date < range.start)
            .unwrap_or(false)
    }));

    let monthly = monthly_rollup(filtered.iter()).months;
    let running_balance = running_balance(&monthly, opening);

    let summary = Summary {
        range: *range,
        categories: category_breakdown(filtered.iter()),
        balance: balance(filtered.iter()),
        income_total: total(filtered.iter(), TransactionKind::Income),
        expense_total: total(filtered.iter(), TransactionKind::Expense),
        highest_expense: highest_expense(filtered.iter()).cloned(),
        transaction_count: filtered.len(),
        monthly,
        running_balance,
        skipped: filtered.skipped,
    };

    debug!(
        start = %range.start,
        end = %range.end,
        transactions = summary.transaction_count,
        skipped = summary.skipped_count(),
        "Summarized transactions"
    );

    summary
}
