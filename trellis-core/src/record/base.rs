//! Records.
use crate::error::TrellisError;
use chrono::prelude::{DateTime, Local};
use std::collections::{
    btree_map::{IntoIter, Iter, Keys},
    BTreeMap,
};

/// Represents possible types of values in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single value, typically a metric such as a loss.
    Scalar(f32),

    /// A timestamp.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

/// Key-value pairs of [`RecordValue`]s, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a record with a single scalar.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        let mut record = Self::empty();
        record.insert(name, RecordValue::Scalar(value));
        record
    }

    /// Creates a record from key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a value, replacing the old one with the same key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Iterates over key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Consumes the record into an iterator over key-value pairs.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Value of a key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` win on key collisions.
    pub fn merge(mut self, record: Record) -> Self {
        self.0.extend(record.0);
        self
    }

    /// Merges `record` into `self`.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Scalar value of a key.
    pub fn get_scalar(&self, k: &str) -> Result<f32, TrellisError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(TrellisError::RecordValueTypeError("Scalar".to_string())),
            None => Err(TrellisError::RecordKeyError(k.to_string())),
        }
    }

    /// Array value of a key.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, TrellisError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(TrellisError::RecordValueTypeError("Array1".to_string())),
            None => Err(TrellisError::RecordKeyError(k.to_string())),
        }
    }

    /// String value of a key.
    pub fn get_string(&self, k: &str) -> Result<String, TrellisError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(TrellisError::RecordValueTypeError("String".to_string())),
            None => Err(TrellisError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns `true` if the record has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let record = Record::from_slice(&[
            ("loss", RecordValue::Scalar(1.5)),
            ("name", RecordValue::String("ppo".into())),
        ]);
        assert_eq!(record.get_scalar("loss"), Ok(1.5));
        assert_eq!(record.get_string("name"), Ok("ppo".to_string()));
        assert_eq!(
            record.get_scalar("name"),
            Err(TrellisError::RecordValueTypeError("Scalar".into()))
        );
        assert_eq!(
            record.get_array1("obs"),
            Err(TrellisError::RecordKeyError("obs".into()))
        );
    }

    #[test]
    fn test_merge_overrides() {
        let a = Record::from_scalar("x", 1.0);
        let b = Record::from_scalar("x", 2.0).merge(Record::from_scalar("y", 3.0));
        let merged = a.merge(b);
        assert_eq!(merged.get_scalar("x"), Ok(2.0));
        assert_eq!(merged.len(), 2);
    }
}
