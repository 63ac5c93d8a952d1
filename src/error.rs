//! Error types for bahador
//!
//! This module provides error handling for the relay pipeline, including:
//! - Domain-specific error variants (fetch, split, upload, cancellation)
//! - Classification into the job error taxonomy ([`ErrorKind`])
//! - Short user-facing messages for chat front-ends
//! - A serializable [`JobError`] that travels back to the job submitter

use crate::types::JobId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bahador operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bahador
///
/// Each variant carries enough context to diagnose the failure from the
/// operator log. What the submitter of a job sees is the coarser
/// [`ErrorKind`] returned by [`Error::kind`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "part_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// No file name could be derived from the response headers or the URL
    #[error("file name is empty")]
    EmptyFileName,

    /// Declared size is above the configured ceiling
    #[error("file size {size} is bigger than maximum file size {max}")]
    MaxFileSizeExceeded {
        /// Size declared by the remote server
        size: u64,
        /// Configured ceiling
        max: u64,
    },

    /// Transferred byte count differs from the declared size
    #[error("incomplete transfer: expected {expected} bytes, got {actual}")]
    IncompleteTransfer {
        /// Size declared by the remote server
        expected: u64,
        /// Bytes actually moved before the mismatch was detected
        actual: u64,
    },

    /// Remote server answered with a non-2xx status
    #[error("non-success HTTP status {status} from {url}")]
    NonSuccessStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Size header missing or unparsable
    #[error("invalid content length: {0}")]
    InvalidContentLength(String),

    /// URL rejected before any request was made
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL as submitted
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// External archiver failed or could not be started
    #[error("archive split failed: {0}")]
    Splitter(String),

    /// Uploading one part (or the single streamed file) failed
    #[error("upload of part {index} failed: {reason}")]
    PartUpload {
        /// 0-based sequence index of the part
        index: usize,
        /// Underlying failure
        reason: String,
    },

    /// Upload sink rejected a request
    #[error("upload sink error: {0}")]
    Sink(String),

    /// Job was cancelled by request or by shutdown
    #[error("job cancelled")]
    Cancelled,

    /// A phase ran past its configured time limit
    #[error("{phase} timed out")]
    DeadlineExceeded {
        /// Name of the phase that timed out
        phase: &'static str,
    },

    /// Insufficient disk space to spool the file
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// A job with this id is already registered
    #[error("job {0} is already registered")]
    DuplicateJob(JobId),

    /// User is not allowed to submit jobs
    #[error("user {0} is not authorized")]
    Unauthorized(i64),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool could not be located
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Job failure taxonomy
///
/// This is the only classification a job submitter sees. Unrecognized
/// failures collapse into [`ErrorKind::InternalError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No file name could be derived
    EmptyFileName,
    /// Declared size above the ceiling
    MaxFileSizeExceeded,
    /// Size header missing or unparsable
    InvalidMetadata,
    /// Declared size differs from transferred bytes
    IncompleteTransfer,
    /// Remote server answered with a non-2xx status
    UpstreamNonSuccessStatus,
    /// Archiver failed or timed out
    SplitterFailure,
    /// Sink upload failed or returned an unusable identifier
    PartUploadFailure,
    /// Cancelled by request or shutdown
    Cancelled,
    /// A phase timed out
    DeadlineExceeded,
    /// Anything else
    InternalError,
}

impl ErrorKind {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::EmptyFileName => "empty_file_name",
            ErrorKind::MaxFileSizeExceeded => "max_file_size_exceeded",
            ErrorKind::InvalidMetadata => "invalid_metadata",
            ErrorKind::IncompleteTransfer => "incomplete_transfer",
            ErrorKind::UpstreamNonSuccessStatus => "upstream_non_success_status",
            ErrorKind::SplitterFailure => "splitter_failure",
            ErrorKind::PartUploadFailure => "part_upload_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Short message suitable for showing to the person who submitted the job
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::EmptyFileName => "file name is empty",
            ErrorKind::MaxFileSizeExceeded => "file size is bigger than maximum file size",
            ErrorKind::InvalidMetadata => "could not determine file size",
            ErrorKind::IncompleteTransfer => "file download is incomplete",
            ErrorKind::UpstreamNonSuccessStatus => "non-zero http response status code",
            ErrorKind::SplitterFailure => "failed to split file into parts",
            ErrorKind::PartUploadFailure => "failed to upload file",
            ErrorKind::Cancelled => "job canceled",
            ErrorKind::DeadlineExceeded => "job timed out",
            ErrorKind::InternalError => "failed to download file (probably internal server error)",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl Error {
    /// Classify this error into the job failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyFileName => ErrorKind::EmptyFileName,
            Error::MaxFileSizeExceeded { .. } => ErrorKind::MaxFileSizeExceeded,
            Error::InvalidContentLength(_) => ErrorKind::InvalidMetadata,
            Error::IncompleteTransfer { .. } => ErrorKind::IncompleteTransfer,
            Error::NonSuccessStatus { .. } => ErrorKind::UpstreamNonSuccessStatus,
            Error::Splitter(_) => ErrorKind::SplitterFailure,
            Error::PartUpload { .. } | Error::Sink(_) => ErrorKind::PartUploadFailure,
            Error::Cancelled | Error::ShuttingDown => ErrorKind::Cancelled,
            Error::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Error::Network(e) if e.is_timeout() => ErrorKind::DeadlineExceeded,
            Error::Config { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::InvalidUrl { .. }
            | Error::InsufficientSpace { .. }
            | Error::DiskSpaceCheckFailed(_)
            | Error::DuplicateJob(_)
            | Error::Unauthorized(_)
            | Error::Network(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::NotSupported(_)
            | Error::Other(_) => ErrorKind::InternalError,
        }
    }
}

/// Failure half of a [`JobResult`](crate::types::JobResult)
///
/// `detail` keeps the full error text for the operator; front-ends should
/// show [`JobError::user_message`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Taxonomy classification
    pub kind: ErrorKind,
    /// Detailed error text
    pub detail: String,
}

impl JobError {
    /// Create a job error from a kind and detail text
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Short user-facing message for this failure
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for JobError {}

impl From<Error> for JobError {
    fn from(error: Error) -> Self {
        Self {
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}
