use anyerror::AnyError;
use thiserror::Error;

use crate::types::IdxTerm;
use crate::types::WorkerId;

/// What the failing I/O or (de)serialization call was operating on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorSubject {
    #[error("snapshot directory for {0}")]
    Snapshot(IdxTerm),
    #[error("snapshot metadata header")]
    SnapshotMeta,
    #[error("snapshot accept stream")]
    AcceptStream,
}

/// What kind of operation was being performed when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorVerb {
    #[error("create")]
    Create,
    #[error("read")]
    Read,
    #[error("write")]
    Write,
    #[error("delete")]
    Delete,
    #[error("seek")]
    Seek,
}

/// Errors a backend can raise while parsing a snapshot's metadata header.
///
/// Kept distinct from [`StorageIOError`] because `init` matches on these specifically
/// to decide whether to fall back to an older directory.
#[derive(Debug, Clone, Error)]
pub enum MetaError {
    #[error("invalid snapshot format")]
    InvalidFormat,
    #[error("unsupported snapshot format version {0}")]
    InvalidVersion(u32),
    #[error("snapshot checksum mismatch")]
    ChecksumError,
    #[error(transparent)]
    Io(#[from] StorageIOError),
}

/// An I/O or (de)serialization failure tagged with what it was operating on.
#[derive(Debug, Clone, Error)]
#[error("failed to {verb} {subject}: {source}")]
pub struct StorageIOError {
    pub subject: ErrorSubject,
    pub verb: ErrorVerb,
    #[source]
    pub source: AnyError,
}

impl StorageIOError {
    pub fn new(subject: ErrorSubject, verb: ErrorVerb, source: AnyError) -> Self {
        StorageIOError { subject, verb, source }
    }

    pub fn from_io_error(subject: ErrorSubject, verb: ErrorVerb, err: std::io::Error) -> Self {
        StorageIOError::new(subject, verb, AnyError::new(&err))
    }
}

/// Top-level error type returned by the manager's public operations.
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] StorageIOError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    /// `accept_chunk` received a chunk number ahead of what it expects; the caller
    /// must discard the in-flight accept and have the peer restart the transfer.
    #[error("out of order chunk: expected {expected}, got {got}")]
    OutOfOrderChunk { expected: u64, got: u64 },

    /// A documented precondition was violated by the caller. These are programmer
    /// errors, not recoverable runtime conditions.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

impl SnapshotError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        SnapshotError::Precondition(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Why a monitored worker went down, reported by the effect dispatcher.
#[derive(Debug, Clone)]
pub struct WorkerDownReason {
    pub worker_id: WorkerId,
    pub message: String,
}
