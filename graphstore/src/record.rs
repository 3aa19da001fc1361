//! Generic indexed-record vocabulary
//!
//! Mirrors the `Record`/`Filter`/`IndexValue` vocabulary the teacher's domain
//! types are written against (`taskstore::{Record, IndexValue, Filter,
//! FilterOp, now_ms}`). `Task` (see [`crate::task`]) implements [`Record`] so
//! the same filter/index machinery used elsewhere in the workspace applies
//! to task queries.

use serde_json::Value;

/// A value usable as a secondary-index key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::Str(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        IndexValue::Str(s)
    }
}

impl From<i64> for IndexValue {
    fn from(v: i64) -> Self {
        IndexValue::Int(v)
    }
}

impl From<bool> for IndexValue {
    fn from(v: bool) -> Self {
        IndexValue::Bool(v)
    }
}

/// Comparison operator for a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single `field OP value` predicate evaluated against a [`Record`]'s index.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate this filter against a record's indexed field set.
    pub fn matches(&self, indexed: &[(&str, IndexValue)]) -> bool {
        let Some((_, actual)) = indexed.iter().find(|(k, _)| *k == self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Ne => actual != &self.value,
            FilterOp::Gt => actual > &self.value,
            FilterOp::Gte => actual >= &self.value,
            FilterOp::Lt => actual < &self.value,
            FilterOp::Lte => actual <= &self.value,
        }
    }
}

/// A type that can be persisted and queried as an indexed record.
///
/// Implementors expose a stable `id()` and a small set of indexed fields
/// (`indexed()`) that [`Filter`]s can be evaluated against without
/// deserializing the full record body.
pub trait Record {
    fn id(&self) -> &str;
    fn indexed(&self) -> Vec<(&str, IndexValue)>;
    fn to_json(&self) -> Value
    where
        Self: serde::Serialize + Sized,
    {
        serde_json::to_value(self).expect("record serialization is infallible for well-formed types")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        id: String,
        priority: i64,
    }

    impl Record for Dummy {
        fn id(&self) -> &str {
            &self.id
        }
        fn indexed(&self) -> Vec<(&str, IndexValue)> {
            vec![("priority", IndexValue::Int(self.priority))]
        }
    }

    #[test]
    fn filter_matches_by_field() {
        let d = Dummy {
            id: "a".into(),
            priority: 5,
        };
        let f = Filter::new("priority", FilterOp::Gte, 3i64);
        assert!(f.matches(&d.indexed()));
        let f2 = Filter::new("priority", FilterOp::Gt, 10i64);
        assert!(!f2.matches(&d.indexed()));
    }

    #[test]
    fn filter_missing_field_never_matches() {
        let d = Dummy {
            id: "a".into(),
            priority: 5,
        };
        let f = Filter::new("nonexistent", FilterOp::Eq, 1i64);
        assert!(!f.matches(&d.indexed()));
    }
}
