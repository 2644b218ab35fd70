//! Primary and secondary indexes over the transaction log.
//!
//! Indexes live in memory and are rebuilt by replaying the log on open.

use crate::error::StoreError;
use crate::types::{Frequency, Transaction, TransactionId, TransactionKind, TxDate};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Secondary, non-unique indexes on the `transactions` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexName {
    UserId,
    Type,
    Category,
    Date,
    Amount,
    Currency,
    Frequency,
}

impl IndexName {
    /// Every index built at schema creation.
    pub const ALL: [IndexName; 7] = [
        IndexName::UserId,
        IndexName::Type,
        IndexName::Category,
        IndexName::Date,
        IndexName::Amount,
        IndexName::Currency,
        IndexName::Frequency,
    ];

    /// Index name as stored in the schema.
    pub fn as_str(self) -> &'static str {
        match self {
            IndexName::UserId => "by_userId",
            IndexName::Type => "by_type",
            IndexName::Category => "by_category",
            IndexName::Date => "by_date",
            IndexName::Amount => "by_amount",
            IndexName::Currency => "by_currency",
            IndexName::Frequency => "by_frequency",
        }
    }

    /// Field path the index is built over.
    pub fn key_path(self) -> &'static str {
        match self {
            IndexName::UserId => "userId",
            IndexName::Type => "type",
            IndexName::Category => "category.name",
            IndexName::Date => "date",
            IndexName::Amount => "amount",
            IndexName::Currency => "currency",
            IndexName::Frequency => "frequency",
        }
    }

    /// The value a transaction is filed under in this index.
    ///
    /// Dates are filed by calendar date; text that does not parse is filed
    /// as-is so the record stays reachable.
    pub fn extract(self, tx: &Transaction) -> IndexValue {
        match self {
            IndexName::UserId => IndexValue::Integer(tx.user_id),
            IndexName::Type => tx.kind.into(),
            IndexName::Category => IndexValue::Text(tx.category.name.clone()),
            IndexName::Date => match tx.date.calendar_date() {
                Some(date) => IndexValue::Date(date),
                None => IndexValue::Text(tx.date.0.clone()),
            },
            IndexName::Amount => IndexValue::from(tx.amount),
            IndexName::Currency => IndexValue::Text(tx.currency.clone()),
            IndexName::Frequency => tx.frequency.into(),
        }
    }

    /// Coerce a query value to the variant this index files under.
    fn normalize(self, value: IndexValue) -> IndexValue {
        match (self, value) {
            (IndexName::Amount, IndexValue::Integer(i)) => IndexValue::from(i as f64),
            (IndexName::UserId, IndexValue::Number(n)) if n.fract() == 0.0 => {
                IndexValue::Integer(n as i64)
            }
            (IndexName::Date, IndexValue::Text(raw)) => match TxDate(raw.clone()).calendar_date() {
                Some(date) => IndexValue::Date(date),
                None => IndexValue::Text(raw),
            },
            (_, value) => value,
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| StoreError::UnknownIndex(s.to_string()))
    }
}

/// A key in a secondary index.
///
/// Values of different variants never compare equal; within a variant the
/// natural order applies (`f64` by total order).
#[derive(Clone, Debug)]
pub enum IndexValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl IndexValue {
    fn rank(&self) -> u8 {
        match self {
            IndexValue::Integer(_) => 0,
            IndexValue::Number(_) => 1,
            IndexValue::Date(_) => 2,
            IndexValue::Text(_) => 3,
        }
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexValue::Integer(a), IndexValue::Integer(b)) => a.cmp(b),
            (IndexValue::Number(a), IndexValue::Number(b)) => a.total_cmp(b),
            (IndexValue::Text(a), IndexValue::Text(b)) => a.cmp(b),
            (IndexValue::Date(a), IndexValue::Date(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Integer(v)
    }
}

impl From<f64> for IndexValue {
    fn from(v: f64) -> Self {
        // -0.0 and 0.0 are the same amount
        IndexValue::Number(if v == 0.0 { 0.0 } else { v })
    }
}

impl From<&str> for IndexValue {
    fn from(v: &str) -> Self {
        IndexValue::Text(v.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(v: String) -> Self {
        IndexValue::Text(v)
    }
}

impl From<NaiveDate> for IndexValue {
    fn from(v: NaiveDate) -> Self {
        IndexValue::Date(v)
    }
}

impl From<TransactionKind> for IndexValue {
    fn from(v: TransactionKind) -> Self {
        IndexValue::Text(v.as_str().to_string())
    }
}

impl From<Frequency> for IndexValue {
    fn from(v: Frequency) -> Self {
        IndexValue::Text(v.as_str().to_string())
    }
}

type SecondaryIndex = BTreeMap<IndexValue, BTreeSet<TransactionId>>;

/// Index mapping primary keys to log offsets, plus the secondary indexes.
///
/// Lock order: `primary`, then `secondary`, then `filed_under`.
pub struct RecordIndex {
    /// Primary key to offset of the live `Put` frame.
    primary: RwLock<BTreeMap<TransactionId, u64>>,

    /// Index name to value to record ids.
    secondary: RwLock<HashMap<IndexName, SecondaryIndex>>,

    /// Values each record is filed under, for removal without a log read.
    filed_under: RwLock<HashMap<TransactionId, Vec<(IndexName, IndexValue)>>>,
}

impl RecordIndex {
    /// Create an empty index with every secondary index defined.
    pub fn new() -> Self {
        let secondary = IndexName::ALL
            .into_iter()
            .map(|name| (name, SecondaryIndex::new()))
            .collect();

        Self {
            primary: RwLock::new(BTreeMap::new()),
            secondary: RwLock::new(secondary),
            filed_under: RwLock::new(HashMap::new()),
        }
    }

    /// File a record, replacing any previous version of it.
    pub fn insert(&self, tx: &Transaction, offset: u64) {
        let mut primary = self.primary.write();
        let mut secondary = self.secondary.write();
        let mut filed_under = self.filed_under.write();

        if let Some(previous) = filed_under.remove(&tx.id) {
            Self::unfile(&mut secondary, &tx.id, previous);
        }

        let values: Vec<_> = IndexName::ALL
            .into_iter()
            .map(|name| (name, name.extract(tx)))
            .collect();

        for (name, value) in &values {
            secondary
                .entry(*name)
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(tx.id.clone());
        }

        filed_under.insert(tx.id.clone(), values);
        primary.insert(tx.id.clone(), offset);
    }

    /// Remove a record. Returns its offset if it was present.
    pub fn remove(&self, id: &TransactionId) -> Option<u64> {
        let mut primary = self.primary.write();
        let mut secondary = self.secondary.write();
        let mut filed_under = self.filed_under.write();

        if let Some(previous) = filed_under.remove(id) {
            Self::unfile(&mut secondary, id, previous);
        }

        primary.remove(id)
    }

    /// Remove every record.
    pub fn clear(&self) {
        let mut primary = self.primary.write();
        let mut secondary = self.secondary.write();
        let mut filed_under = self.filed_under.write();

        primary.clear();
        secondary.values_mut().for_each(BTreeMap::clear);
        filed_under.clear();
    }

    /// Offset of the live frame for a record.
    pub fn offset_of(&self, id: &TransactionId) -> Option<u64> {
        self.primary.read().get(id).copied()
    }

    /// Re-point a record at a new frame (after compaction).
    pub fn set_offset(&self, id: &TransactionId, offset: u64) {
        if let Some(slot) = self.primary.write().get_mut(id) {
            *slot = offset;
        }
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.primary.read().contains_key(id)
    }

    /// Every live record with its offset, in primary-key order.
    pub fn entries(&self) -> Vec<(TransactionId, u64)> {
        self.primary
            .read()
            .iter()
            .map(|(id, offset)| (id.clone(), *offset))
            .collect()
    }

    /// Records filed under exactly `value`, in primary-key order.
    pub fn lookup(&self, name: IndexName, value: IndexValue) -> Vec<TransactionId> {
        let value = name.normalize(value);
        self.secondary
            .read()
            .get(&name)
            .and_then(|index| index.get(&value))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records filed under a value in `[low, high]`, in index order.
    pub fn range(&self, name: IndexName, low: IndexValue, high: IndexValue) -> Vec<TransactionId> {
        let low = name.normalize(low);
        let high = name.normalize(high);
        if low > high {
            return Vec::new();
        }

        self.secondary
            .read()
            .get(&name)
            .map(|index| {
                index
                    .range(low..=high)
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.primary.read().len()
    }

    fn unfile(
        secondary: &mut HashMap<IndexName, SecondaryIndex>,
        id: &TransactionId,
        values: Vec<(IndexName, IndexValue)>,
    ) {
        for (name, value) in values {
            if let Some(index) = secondary.get_mut(&name) {
                if let Some(ids) = index.get_mut(&value) {
                    ids.remove(id);
                    if ids.is_empty() {
                        index.remove(&value);
                    }
                }
            }
        }
    }
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, TransactionInput};
    use chrono::Utc;

    fn tx(id: &str, kind: TransactionKind, category: &str, amount: f64, date: &str) -> Transaction {
        let now = Utc::now();
        let category = Category::new(category, "more_horiz");
        let input = TransactionInput::new(id, kind, category, amount, date);
        Transaction::from_input(input, now, now)
    }

    fn ids(raw: &[&str]) -> Vec<TransactionId> {
        raw.iter().map(|s| TransactionId::from(*s)).collect()
    }

    #[test]
    fn test_insert_and_lookup() {
        let index = RecordIndex::new();

        index.insert(&tx("a", TransactionKind::Expense, "Food", 50.0, "2024-01-10"), 5);
        index.insert(&tx("b", TransactionKind::Expense, "Transport", 30.0, "2024-01-20"), 40);
        index.insert(&tx("c", TransactionKind::Income, "Salary", 200.0, "2024-01-05"), 80);

        assert_eq!(index.count(), 3);
        assert_eq!(index.offset_of(&TransactionId::from("b")), Some(40));
        assert_eq!(
            index.lookup(IndexName::Type, TransactionKind::Expense.into()),
            ids(&["a", "b"])
        );
        assert_eq!(index.lookup(IndexName::Category, "Salary".into()), ids(&["c"]));
        assert_eq!(index.lookup(IndexName::UserId, 1i64.into()), ids(&["a", "b", "c"]));
        assert_eq!(index.lookup(IndexName::Amount, 30.0.into()), ids(&["b"]));
        assert_eq!(index.lookup(IndexName::Currency, "EUR".into()), ids(&["a", "b", "c"]));
        assert_eq!(
            index.lookup(IndexName::Frequency, Frequency::None.into()),
            ids(&["a", "b", "c"])
        );
        assert!(index.lookup(IndexName::Category, "Nope".into()).is_empty());
    }

    #[test]
    fn test_query_values_are_normalized() {
        let index = RecordIndex::new();
        index.insert(&tx("a", TransactionKind::Expense, "Food", 50.0, "2024-01-10"), 5);

        assert_eq!(index.lookup(IndexName::Amount, 50i64.into()), ids(&["a"]));
        assert_eq!(index.lookup(IndexName::UserId, 1.0.into()), ids(&["a"]));
    }

    #[test]
    fn test_reinsert_moves_index_entries() {
        let index = RecordIndex::new();

        index.insert(&tx("a", TransactionKind::Expense, "Food", 50.0, "2024-01-10"), 5);
        index.insert(&tx("a", TransactionKind::Income, "Gift", 10.0, "2024-02-01"), 90);

        assert_eq!(index.count(), 1);
        assert_eq!(index.offset_of(&TransactionId::from("a")), Some(90));
        assert!(index.lookup(IndexName::Category, "Food".into()).is_empty());
        assert!(index.lookup(IndexName::Type, TransactionKind::Expense.into()).is_empty());
        assert_eq!(index.lookup(IndexName::Category, "Gift".into()), ids(&["a"]));
    }

    #[test]
    fn test_remove_and_clear() {
        let index = RecordIndex::new();

        index.insert(&tx("a", TransactionKind::Expense, "Food", 50.0, "2024-01-10"), 5);
        index.insert(&tx("b", TransactionKind::Expense, "Food", 20.0, "2024-01-11"), 40);

        assert_eq!(index.remove(&TransactionId::from("a")), Some(5));
        assert_eq!(index.remove(&TransactionId::from("a")), None);
        assert_eq!(index.lookup(IndexName::Category, "Food".into()), ids(&["b"]));

        index.clear();
        assert_eq!(index.count(), 0);
        assert!(index.lookup(IndexName::Category, "Food".into()).is_empty());
    }

    #[test]
    fn test_date_index_and_range() {
        let index = RecordIndex::new();

        index.insert(&tx("jan", TransactionKind::Expense, "Food", 1.0, "2024-01-31T22:00:00"), 5);
        index.insert(&tx("feb", TransactionKind::Expense, "Food", 1.0, "2024-02-15"), 40);
        index.insert(&tx("mar", TransactionKind::Expense, "Food", 1.0, "2024-03-01"), 80);
        index.insert(&tx("bad", TransactionKind::Expense, "Food", 1.0, "someday"), 120);

        let jan31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(index.lookup(IndexName::Date, jan31.into()), ids(&["jan"]));
        assert_eq!(index.lookup(IndexName::Date, "someday".into()), ids(&["bad"]));

        let range = index.range(
            IndexName::Date,
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().into(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().into(),
        );
        assert_eq!(range, ids(&["jan", "feb"]));

        // Inverted bounds are empty rather than a panic
        let inverted = index.range(
            IndexName::Date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().into(),
        );
        assert!(inverted.is_empty());

        // Text queries resolve to the same calendar day
        assert_eq!(index.lookup(IndexName::Date, "2024-02-15".into()), ids(&["feb"]));
        assert_eq!(index.lookup(IndexName::Date, "2024-01-31".into()), ids(&["jan"]));
        let text_range = index.range(IndexName::Date, "2024-02-01".into(), "2024-03-31".into());
        assert_eq!(text_range, ids(&["feb", "mar"]));
    }

    #[test]
    fn test_amount_range() {
        let index = RecordIndex::new();
        for (id, amount) in [("a", 5.0), ("b", 50.0), ("c", 500.0)] {
            index.insert(&tx(id, TransactionKind::Expense, "Food", amount, "2024-01-10"), 5);
        }

        assert_eq!(index.range(IndexName::Amount, 10.0.into(), 500.0.into()), ids(&["b", "c"]));
    }

    #[test]
    fn test_index_names() {
        for name in IndexName::ALL {
            assert_eq!(name.as_str().parse::<IndexName>().unwrap(), name);
        }
        assert_eq!(IndexName::Category.key_path(), "category.name");
        assert!(matches!(
            "by_colour".parse::<IndexName>(),
            Err(StoreError::UnknownIndex(_))
        ));
    }

    #[test]
    fn test_index_value_ordering() {
        assert_eq!(IndexValue::from(-0.0), IndexValue::from(0.0));
        assert!(IndexValue::from(1.5) < IndexValue::from(2.0));
        assert_ne!(IndexValue::from(1i64), IndexValue::from(1.0));
        assert!(IndexValue::from("a") < IndexValue::from("b"));
    }
}
