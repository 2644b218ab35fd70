//! Core types for the transaction store.

use crate::error::MalformedDate;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied primary key of a transaction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        TransactionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        TransactionId(s.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        TransactionId(s)
    }
}

/// A spending category. `name` is the identity; there is no surrogate id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub icon: String,
}

impl Category {
    pub fn new(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
        }
    }
}

/// Direction of money flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a transaction repeats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Weekly,
    Monthly,
    Yearly,
    #[default]
    None,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
            Frequency::None => "none",
        }
    }
}

/// Currency assumed when a caller does not supply one.
pub const DEFAULT_CURRENCY: &str = "EUR";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Semantic date of a transaction, kept as the text the caller supplied.
///
/// The store never rejects a date; parsing happens when a calendar date is
/// needed (indexing, aggregation).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxDate(pub String);

impl TxDate {
    /// Parse into a date-time. Date-only values are midnight.
    pub fn parse(&self) -> Option<NaiveDateTime> {
        let s = self.0.trim();

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_local());
        }
        const FORMATS: [&str; 4] = [
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
        ];
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    }

    /// Calendar date, if the text parses.
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        self.parse().map(|dt| dt.date())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NaiveDate> for TxDate {
    fn from(date: NaiveDate) -> Self {
        TxDate(date.format("%Y-%m-%d").to_string())
    }
}

impl From<NaiveDateTime> for TxDate {
    fn from(dt: NaiveDateTime) -> Self {
        TxDate(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

impl From<&str> for TxDate {
    fn from(s: &str) -> Self {
        TxDate(s.to_string())
    }
}

impl fmt::Display for TxDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input for writing a transaction (before audit timestamps are assigned).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub id: TransactionId,
    pub category: Category,
    pub amount: f64,
    pub currency: String,
    pub date: TxDate,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub frequency: Frequency,
    pub user_id: i64,
}

impl TransactionInput {
    /// New input with the given id; label defaults to the category name.
    pub fn new(
        id: impl Into<TransactionId>,
        kind: TransactionKind,
        category: Category,
        amount: f64,
        date: impl Into<TxDate>,
    ) -> Self {
        Self {
            id: id.into(),
            name: category.name.clone(),
            category,
            amount,
            currency: default_currency(),
            date: date.into(),
            kind,
            frequency: Frequency::None,
            user_id: 1,
        }
    }

    pub fn expense(
        id: impl Into<TransactionId>,
        category: Category,
        amount: f64,
        date: impl Into<TxDate>,
    ) -> Self {
        Self::new(id, TransactionKind::Expense, category, amount, date)
    }

    pub fn income(
        id: impl Into<TransactionId>,
        category: Category,
        amount: f64,
        date: impl Into<TxDate>,
    ) -> Self {
        Self::new(id, TransactionKind::Income, category, amount, date)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }
}

/// A persisted transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub category: Category,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub date: TxDate,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub frequency: Frequency,
    pub user_id: i64,
    /// Set by the store on first insert.
    pub created_at: DateTime<Utc>,
    /// Set by the store on every write.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Stamp an input with audit timestamps.
    pub fn from_input(
        input: TransactionInput,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: input.id,
            category: input.category,
            amount: input.amount,
            currency: input.currency,
            date: input.date,
            name: input.name,
            kind: input.kind,
            frequency: input.frequency,
            user_id: input.user_id,
            created_at,
            updated_at,
        }
    }

    /// The caller-owned fields, without audit timestamps.
    pub fn to_input(&self) -> TransactionInput {
        TransactionInput {
            id: self.id.clone(),
            category: self.category.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            date: self.date.clone(),
            name: self.name.clone(),
            kind: self.kind,
            frequency: self.frequency,
            user_id: self.user_id,
        }
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionKind::Income
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionKind::Expense
    }

    /// Calendar date of `date`, or the record that could not be read.
    pub fn calendar_date(&self) -> std::result::Result<NaiveDate, MalformedDate> {
        self.date.calendar_date().ok_or_else(|| MalformedDate {
            id: self.id.clone(),
            value: self.date.0.clone(),
        })
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub record_count: u64,
    pub log_size_bytes: u64,
    pub schema_version: u32,
}
