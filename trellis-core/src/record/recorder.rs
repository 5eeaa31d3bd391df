//! Recorder traits.
use super::Record;

/// Writes records.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// Stores records and writes their aggregation on [`AggregateRecorder::flush`].
pub trait AggregateRecorder {
    /// Stores a record.
    fn store(&mut self, record: Record);

    /// Writes the aggregation of stored records, tagged with `step`, and discards them.
    fn flush(&mut self, step: i64);
}
