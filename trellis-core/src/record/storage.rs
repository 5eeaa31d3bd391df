//! Aggregation of records.
use super::{Record, RecordValue};
use std::collections::BTreeSet;

/// Stores records and aggregates them.
///
/// Scalars stored more than once are aggregated into `<key>_min`, `<key>_max` and
/// `<key>_mean`. Other values keep their latest value.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> f32 {
    vs.iter().cloned().fold(f32::INFINITY, f32::min)
}

fn max(vs: &[f32]) -> f32 {
    vs.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
}

fn mean(vs: &[f32]) -> f32 {
    vs.iter().sum::<f32>() / vs.len() as f32
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    fn keys(&self) -> BTreeSet<String> {
        self.data
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect()
    }

    fn aggregate_key(&self, key: &str) -> Record {
        let scalars: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();
        let latest = self.data.iter().rev().find_map(|record| record.get(key));

        match (scalars.len(), latest) {
            (0, Some(value)) => Record::from_slice(&[(key, value.clone())]),
            (0, None) => Record::empty(),
            (1, _) => Record::from_scalar(key, scalars[0]),
            _ => Record::from_slice(&[
                (format!("{}_min", key), RecordValue::Scalar(min(&scalars))),
                (format!("{}_max", key), RecordValue::Scalar(max(&scalars))),
                (format!("{}_mean", key), RecordValue::Scalar(mean(&scalars))),
            ]),
        }
    }

    /// Aggregates the stored records and discards them.
    pub fn aggregate(&mut self) -> Record {
        let record = self
            .keys()
            .iter()
            .fold(Record::empty(), |record, key| record.merge(self.aggregate_key(key)));
        self.data.clear();
        record
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [1.0f32, 2.0, 6.0].iter() {
            storage.store(Record::from_scalar("loss", *v));
        }
        storage.store(Record::from_slice(&[
            ("tag", RecordValue::String("a".into())),
            ("lr", RecordValue::Scalar(0.1)),
        ]));
        storage.store(Record::from_slice(&[("tag", RecordValue::String("b".into()))]));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss_min"), Ok(1.0));
        assert_eq!(record.get_scalar("loss_max"), Ok(6.0));
        assert_eq!(record.get_scalar("loss_mean"), Ok(3.0));
        assert_eq!(record.get_scalar("lr"), Ok(0.1));
        assert_eq!(record.get_string("tag"), Ok("b".to_string()));
        assert!(storage.aggregate().is_empty());
    }
}
