//! sheetscan — OMR answer-sheet scanning pipeline.
//!
//! Converts a photographed or uploaded capture of a printed bubble answer
//! sheet into a per-question answer map, resolves the test-taker from the
//! QR code printed in the sheet header, and reconciles detected marks
//! against a (possibly per-student-variant) answer key. The stages are:
//!
//! 1. **Layout** – the versioned page-geometry contract shared with the
//!    sheet-printing collaborator: millimetre constants and the
//!    bubble-center lookup.
//! 2. **Acquire** – one `FrameSource` seam over continuous devices and
//!    static image files, producing raw RGBA buffers.
//! 3. **Normalize** – direct resample of a raw buffer onto the canonical
//!    A4 raster plus BT.601 grayscale derivation.
//! 4. **Detect** – disc intensity sampling at every bubble center,
//!    threshold decision, sheet confidence.
//! 5. **Identity** – rqrr QR decode (both polarities) into an identity
//!    payload; acceptance, mismatch and answer-key policy in
//!    [`IdentityLock`].
//! 6. **Session** – the capture → review → saved state machine with
//!    operator overrides and persistence hand-off.
//!
//! Detection is pure over its inputs: the session retains the raw capture
//! so the operator can re-run it at a different sensitivity without
//! re-acquiring. Identity scanning runs on its own cancellable loop
//! ([`IdentityScanner`]) and never performs detection work.

pub mod acquire;
pub mod detect;
pub mod error;
pub mod identity;
pub mod keys;
pub mod layout;
pub mod normalize;
pub mod scan_loop;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use acquire::{FrameSource, PixelBuffer, StillImageSource};
pub use detect::{detect_marks, AnswerMap, DetectionResult, DEFAULT_THRESHOLD};
pub use error::{AcquireError, KeyFetchError, LayoutError, SaveError, SessionError};
pub use identity::{decode_identity, encode_payload, parse_payload, IdentityPayload};
pub use keys::{AnswerKey, IdentityLock, IdentityOutcome, KeyProvider};
pub use layout::SubjectSpec;
pub use normalize::{grayscale, normalize, CanonicalBuffer};
pub use scan_loop::IdentityScanner;
pub use session::{ResultSink, ResultSource, ScanRecord, ScanSession, ScanState, Verdict};
