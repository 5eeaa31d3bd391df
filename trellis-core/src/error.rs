//! Errors in the library.
use thiserror::Error;

/// Errors raised by the data model, the environments and the replay buffers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrellisError {
    /// Key of a record was not found.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// A record value has a type different from the requested one.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// Two calls on a guarded environment overlapped.
    #[error(
        "Detected concurrent execution of GuardedEnv calls. \
         Make sure the appropriate step_state is passed to step()"
    )]
    ConcurrentExecution,

    /// The major dimension of an action does not equal the batch size of the environment.
    #[error(
        "Expected actions whose major dimension is batch_size ({batch_size}), \
         but saw action with shape {shape:?}"
    )]
    BatchDimMismatch {
        /// Batch size of the environment.
        batch_size: usize,
        /// Shape of the offending action.
        shape: Vec<usize>,
    },

    /// Two nests do not have the same structure.
    #[error("Nest structure mismatch: {0}")]
    StructureMismatch(String),

    /// Arrays with different dtypes were combined.
    #[error("DType mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        /// Expected dtype.
        expected: String,
        /// Given dtype.
        got: String,
    },

    /// Arrays with incompatible shapes were combined.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The replay buffer does not hold enough items for the request.
    #[error("Not enough items in the replay buffer: requested {requested}, size {size}")]
    NotEnoughItems {
        /// Number of consecutive items requested.
        requested: usize,
        /// Number of items in the buffer.
        size: usize,
    },

    /// Experience given to an agent does not match its collect data spec.
    #[error("Invalid experience: {0}")]
    InvalidExperience(String),

    /// A frame hash was not found in the frame buffer.
    #[error("Frame {0:#x} is not stored in the frame buffer")]
    MissingFrame(u64),

    /// A worker of a parallel environment is not available.
    #[error("Environment worker {0} is disconnected")]
    WorkerDisconnected(usize),
}
