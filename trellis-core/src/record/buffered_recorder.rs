use super::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};

/// Keeps records in memory.
///
/// Records given to [`Recorder::write`] are kept as is. Records given to
/// [`AggregateRecorder::store`] are aggregated on flush and kept with an additional
/// `step` scalar.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
}

impl BufferedRecorder {
    /// Creates a recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over the kept records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of kept records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record is kept.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let mut record = self.storage.aggregate();
        if !record.is_empty() {
            record.insert("step", RecordValue::Scalar(step as f32));
            self.buf.push(record);
        }
    }
}
