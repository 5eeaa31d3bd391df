//! Writes trellis records as TensorBoard event files.
use log::warn;
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;
use trellis_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};

/// Writes records to TFRecord event files.
///
/// Only [`RecordValue::Scalar`]s are written; [`RecordValue::DateTime`]s are discarded.
/// Other values are skipped with a warning unless the recorder was built with
/// [`TensorboardRecorder::ignore_unsupported_value`].
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    storage: RecordStorage,
    step_key: String,
    ignore_unsupported_value: bool,
}

impl TensorboardRecorder {
    /// Creates a recorder writing event files in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            storage: RecordStorage::new(),
            step_key: "step".to_string(),
            ignore_unsupported_value: false,
        }
    }

    /// Sets the key of the step in records given to [`Recorder::write`].
    pub fn step_key(mut self, v: impl Into<String>) -> Self {
        self.step_key = v.into();
        self
    }

    /// Silently skips values that cannot be written.
    pub fn ignore_unsupported_value(mut self, v: bool) -> Self {
        self.ignore_unsupported_value = v;
        self
    }

    fn write_with_step(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::DateTime(_) => {}
                _ => {
                    if !self.ignore_unsupported_value {
                        warn!("Skip unsupported value of {}", k);
                    }
                }
            }
        }
        let _ = self.writer.flush();
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes scalars of `record` tagged with its step.
    ///
    /// Records without a scalar under the step key are skipped.
    fn write(&mut self, record: Record) {
        match record.get(&self.step_key) {
            Some(RecordValue::Scalar(step)) => {
                let step = *step as usize;
                self.write_with_step(&record, step);
            }
            _ => warn!("Skip record without scalar {:?}", self.step_key),
        }
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let record = self.storage.aggregate();
        if !record.is_empty() {
            self.write_with_step(&record, step.max(0) as usize);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_event_file() -> std::io::Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        recorder.store(Record::from_scalar("loss", 1.0));
        recorder.store(Record::from_scalar("loss", 3.0));
        recorder.store(Record::from_slice(&[(
            "env",
            RecordValue::String("counting".to_string()),
        )]));
        recorder.flush(10);

        let mut record = Record::from_scalar("step", 20.0);
        record.insert("eval_return", RecordValue::Scalar(2.0));
        recorder.write(record);
        recorder.write(Record::from_scalar("no_step", 1.0));

        let n = std::fs::read_dir(dir.path())?.count();
        assert!(n > 0);
        Ok(())
    }
}
