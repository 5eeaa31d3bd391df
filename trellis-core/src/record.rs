//! Types and traits for recording training metrics.
//!
//! A [`Record`] maps keys to [`RecordValue`]s. [`Recorder`]s write records immediately,
//! while [`AggregateRecorder`]s store them and write aggregated values on
//! [`AggregateRecorder::flush`].
//!
//! ```rust
//! use trellis_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("obs", RecordValue::Array1(vec![1.0, 2.0]));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
