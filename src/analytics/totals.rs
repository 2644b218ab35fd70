//! Sums over transaction sets.

use crate::types::{Transaction, TransactionKind};

/// Sum of amounts of one kind.
pub fn total<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    kind: TransactionKind,
) -> f64 {
    transactions
        .into_iter()
        .filter(|tx| tx.kind == kind)
        .map(|tx| tx.amount)
        .sum()
}

/// Income minus expenses. 0 for no transactions.
pub fn balance<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> f64 {
    transactions.into_iter().fold(0.0, |acc, tx| match tx.kind {
        TransactionKind::Income => acc + tx.amount,
        TransactionKind::Expense => acc - tx.amount,
    })
}

/// The largest expense; the earliest one wins a tie.
pub fn highest_expense<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Option<&'a Transaction> {
    transactions
        .into_iter()
        .filter(|tx| tx.is_expense())
        .fold(None::<&'a Transaction>, |best, tx| match best {
            Some(current) if current.amount >= tx.amount => Some(current),
            _ => Some(tx),
        })
}
