//! Column -> value mapping used by insert and update.

use std::collections::BTreeMap;

use relstore_db::Value;

/// Ordered column/value pairs.
///
/// Columns iterate in sorted order, so the column list and the positional
/// bind arguments built from one bucket always line up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuesBucket {
    values: BTreeMap<String, Value>,
}

impl ValuesBucket {
    /// Empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`put`](Self::put).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    /// Sets `column`, replacing any previous value.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Sets `column` to NULL.
    pub fn put_null(&mut self, column: impl Into<String>) {
        self.values.insert(column.into(), Value::Null);
    }

    /// Removes `column`.
    pub fn delete(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    /// Value stored for `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Whether `column` is present.
    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ValuesBucket {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
