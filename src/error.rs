//! Error types for the ingestion pipeline.
//!
//! This module provides the [`MarcMapError`] type for all pipeline operations
//! and the [`Result`] convenience type. Every error carries a [`Severity`]
//! that tells callers whether the whole stream must be abandoned or whether
//! processing may continue past the failing unit.

use thiserror::Error;

/// Whether an error must abort the stream or only affects one unit of work.
///
/// Recoverable errors may be downgraded to diagnostics by a lenient decoder
/// or a worker that abandons a single record; fatal errors never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The stream or pipeline cannot continue.
    Fatal,
    /// The current field or record is lost, but processing may continue.
    Recoverable,
}

/// Error type for all ingestion pipeline operations.
#[derive(Error, Debug)]
pub enum MarcMapError {
    /// The 24-byte record label is missing, short, or carries non-numeric
    /// length fields.
    #[error("Invalid leader: {0}")]
    InvalidLeader(String),

    /// A directory entry is malformed: the directory length is not a multiple
    /// of the entry width, or an entry carries non-numeric length/start.
    #[error("Invalid directory: {0}")]
    InvalidDirectory(String),

    /// A field's declared (length, start) range falls outside the data area.
    #[error("Field {tag} out of range: start {start} length {length}, data area {available} bytes")]
    FieldOutOfRange {
        /// Tag of the offending directory entry.
        tag: String,
        /// Declared start position relative to the base address.
        start: usize,
        /// Declared field length.
        length: usize,
        /// Size of the data area actually present.
        available: usize,
    },

    /// End of stream inside a partially read record. Always fatal.
    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    /// Error related to character encoding conversion.
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// The specification table could not be parsed or validated.
    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    /// A specification entry names a handler that is not registered.
    /// Raised eagerly at load time, never at dispatch time.
    #[error("Unknown entity handler '{0}' in specification")]
    UnknownHandler(String),

    /// An entity handler failed while building the current record's resource.
    #[error("Handler error in record {record_number}: {message}")]
    HandlerError {
        /// Record number of the job being built.
        record_number: u64,
        /// Handler-supplied failure description.
        message: String,
    },

    /// The per-record state was mutated after it had been sealed.
    #[error("Record state is sealed, mutation rejected")]
    StateSealed,

    /// A job was submitted after the queue began shutdown.
    #[error("Queue is closed, job dropped")]
    QueueClosed,

    /// Workers did not finish within the shutdown timeout.
    #[error("Shutdown timed out after {0:?} with {1} workers still running")]
    ShutdownTimeout(std::time::Duration, usize),

    /// IO error from the underlying source.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MarcMapError {
    /// Classify this error as fatal or recoverable.
    ///
    /// The classification is what a lenient decoder or a worker consults when
    /// deciding whether to skip the current unit and continue.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            MarcMapError::InvalidDirectory(_)
            | MarcMapError::FieldOutOfRange { .. }
            | MarcMapError::EncodingError(_)
            | MarcMapError::HandlerError { .. }
            | MarcMapError::QueueClosed => Severity::Recoverable,
            MarcMapError::InvalidLeader(_)
            | MarcMapError::TruncatedRecord(_)
            | MarcMapError::InvalidSpecification(_)
            | MarcMapError::UnknownHandler(_)
            | MarcMapError::StateSealed
            | MarcMapError::ShutdownTimeout(_, _)
            | MarcMapError::IoError(_) => Severity::Fatal,
        }
    }

    /// Returns true if this error may be skipped by a lenient consumer.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }
}

/// Convenience type alias for [`std::result::Result`] with [`MarcMapError`].
pub type Result<T> = std::result::Result<T, MarcMapError>;
