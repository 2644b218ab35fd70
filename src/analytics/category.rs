//! Spending split by category.

use crate::types::Transaction;
use serde::Serialize;
use std::collections::HashMap;

/// An expense category's share of total spending.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub category: String,
    pub amount: f64,
    /// Percent of all expenses, 0 to 100.
    pub percentage: f64,
}

/// Group expenses by category name, largest first.
///
/// Income is ignored. Categories with equal totals keep the order in which
/// they were first seen. Percentages are 0 when the expense total is 0.
pub fn category_breakdown<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Vec<CategoryShare> {
    let mut shares: Vec<CategoryShare> = Vec::new();
    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    for tx in transactions.into_iter().filter(|tx| tx.is_expense()) {
        let name = tx.category.name.as_str();
        match positions.get(name) {
            Some(&i) => shares[i].amount += tx.amount,
            None => {
                positions.insert(name, shares.len());
                shares.push(CategoryShare {
                    category: name.to_string(),
                    amount: tx.amount,
                    percentage: 0.0,
                });
            }
        }
    }

    let total: f64 = shares.iter().map(|share| share.amount).sum();
    if total != 0.0 {
        for share in &mut shares {
            share.percentage = 100.0 * share.amount / total;
        }
    }

    // Stable, so ties stay in first-seen order
    shares.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::{expense, income};

    #[test]
    fn test_breakdown_ignores_income() {
        let txs = vec![
            expense("a", "Food", 50.0, "2024-01-10"),
            expense("b", "Transport", 30.0, "2024-01-20"),
            income("c", "Salaire", 200.0, "2024-01-05"),
        ];

        let shares = category_breakdown(&txs);
        assert_eq!(
            shares,
            vec![
                CategoryShare {
                    category: "Food".into(),
                    amount: 50.0,
                    percentage: 62.5
                },
                CategoryShare {
                    category: "Transport".into(),
                    amount: 30.0,
                    percentage: 37.5
                },
            ]
        );
    }

    #[test]
    fn test_groups_by_name() {
        let txs = vec![
            expense("a", "Transport", 10.0, "2024-01-10"),
            expense("b", "Food", 25.0, "2024-01-11"),
            expense("c", "Transport", 20.0, "2024-02-01"),
        ];

        let shares = category_breakdown(&txs);
        assert_eq!(shares[0].category, "Transport");
        assert_eq!(shares[0].amount, 30.0);
        assert_eq!(shares[1].category, "Food");
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let txs = vec![
            expense("a", "Santé", 20.0, "2024-01-10"),
            expense("b", "Logement", 20.0, "2024-01-11"),
            expense("c", "Autre", 40.0, "2024-01-12"),
            expense("d", "Transport", 20.0, "2024-01-13"),
        ];

        let names: Vec<String> = category_breakdown(&txs)
            .into_iter()
            .map(|share| share.category)
            .collect();
        assert_eq!(names, vec!["Autre", "Santé", "Logement", "Transport"]);
    }

    #[test]
    fn test_zero_total() {
        let txs = vec![
            expense("a", "Food", 0.0, "2024-01-10"),
            expense("b", "Transport", 0.0, "2024-01-11"),
        ];

        let shares = category_breakdown(&txs);
        assert_eq!(shares.len(), 2);
        assert!(shares.iter().all(|share| share.percentage == 0.0));
    }

    #[test]
    fn test_empty() {
        assert!(category_breakdown(&Vec::<Transaction>::new()).is_empty());
        let only_income = vec![income("a", "Salaire", 10.0, "2024-01-01")];
        assert!(category_breakdown(&only_income).is_empty());
    }
}
