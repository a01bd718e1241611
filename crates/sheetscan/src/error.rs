//! Failure taxonomy.
//!
//! Every failure here degrades to a retryable operator-facing state; the
//! pipeline has no fatal path. An identity decode *miss* is not an error
//! (it is `Option::None`), and an exam-identifier mismatch is reported as
//! [`crate::keys::IdentityOutcome::ExamMismatch`] rather than an `Err`.

use thiserror::Error;

use crate::session::ScanState;

/// Capture/upload failures. Never auto-retried; the operator is
/// re-prompted.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Device access denied — remediable via system settings.
    #[error("capture permission denied: {0}")]
    Permission(String),
    /// Device busy, disconnected, or otherwise unavailable — retry suggested.
    #[error("capture device unavailable: {0}")]
    Device(String),
    /// Static file could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    /// Raw buffer length does not match its declared RGBA dimensions.
    #[error("invalid pixel buffer: {width}x{height} RGBA needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    /// A zero-sized frame carries nothing to sample.
    #[error("zero-sized frame ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },
}

/// Subject configurations that do not physically fit the printed layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("no subjects configured")]
    NoSubjects,
    #[error("duplicate subject order {0}")]
    DuplicateOrder(u32),
    #[error("subject '{name}' has zero questions")]
    EmptySubject { name: String },
    #[error("subject '{name}' needs {rows} rows per column; at most {max_rows} fit a block")]
    SubjectOverflow {
        name: String,
        rows: u32,
        max_rows: u32,
    },
    #[error("{count} subjects configured; at most {max} blocks fit the page")]
    TooManySubjects { count: usize, max: usize },
    #[error("{0} answer options cannot be labelled A..Z")]
    OptionsOverflow(u32),
}

/// Session operations invoked in the wrong state or against missing data.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation requires the {expected:?} state (currently {actual:?})")]
    WrongState {
        expected: ScanState,
        actual: ScanState,
    },
    #[error("no retained capture to reprocess")]
    NoRetainedCapture,
    #[error("unknown question {question} in subject order {subject_order}")]
    UnknownQuestion { subject_order: u32, question: u32 },
    #[error("option '{0}' is not printed on this sheet")]
    UnknownOption(char),
}

/// Save-time validation failures. The save transition is blocked; nothing
/// is partially persisted.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("saving requires a reviewed capture")]
    NotInReview,
    #[error("saving requires a resolved student identity")]
    IdentityUnresolved,
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Best-effort answer-key fetch failure: disables correctness
/// highlighting, never blocks identity acceptance or saving.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("answer key unavailable: {0}")]
    Unavailable(String),
}
