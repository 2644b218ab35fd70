//! Aggregation over transaction sets.
//!
//! Every function is pure and takes any iterator of `&Transaction`, so it
//! works on a store scan, an index lookup or the rows of a view. Dates are
//! read from `date` only. Records whose date cannot be parsed are left out
//! of date-based aggregates and reported as [`MalformedDate`]s; nothing
//! here returns an error.
//!
//! [`MalformedDate`]: crate::MalformedDate

mod category;
mod monthly;
mod range;
mod summary;
mod totals;

pub use category::{category_breakdown, CategoryShare};
pub use monthly::{
    monthly_rollup, running_balance, BalancePoint, MonthlyRollup, MonthlyTotals, YearMonth,
};
pub use range::{filter_by_range, DateRange, RangeFilter};
pub use summary::{summarize, Summary};
pub use totals::{balance, highest_expense, total};
