//! Answer keys and the identity acceptance policy.
//!
//! [`IdentityLock`] is the caller-side policy around
//! [`crate::identity::decode_identity`]: a decoded payload is accepted
//! only when its exam identifier matches the active exam, is never
//! auto-corrected, and once locked stays locked — a continuous scanning
//! loop can feed the same payload every frame without triggering
//! redundant key fetches or state transitions.

use std::collections::BTreeMap;

use crate::error::KeyFetchError;
use crate::identity::IdentityPayload;

/// Correct answers: subject order (as string) → question number (as
/// string) → correct option letter. Same key semantics as
/// [`crate::detect::AnswerMap`].
pub type AnswerKey = BTreeMap<String, BTreeMap<String, char>>;

/// Persistence-side collaborator resolving per-variant answer keys.
pub trait KeyProvider {
    fn variant_key(&self, exam_id: &str, variant_id: &str) -> Result<AnswerKey, KeyFetchError>;
}

/// Outcome of offering a decoded payload to the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// Payload accepted; identity is now locked for the session.
    Accepted,
    /// An identity was already locked; the offer is a no-op.
    AlreadyLocked,
    /// Exam identifier differs from the active exam; payload discarded.
    ExamMismatch,
}

/// Session-scoped identity slot with idempotent locking.
#[derive(Debug)]
pub struct IdentityLock {
    active_exam_id: String,
    accepted: Option<IdentityPayload>,
    variant_key: Option<AnswerKey>,
}

impl IdentityLock {
    pub fn new(active_exam_id: impl Into<String>) -> Self {
        Self {
            active_exam_id: active_exam_id.into(),
            accepted: None,
            variant_key: None,
        }
    }

    /// The exam this session is scanning for.
    pub fn active_exam_id(&self) -> &str {
        &self.active_exam_id
    }

    /// The accepted identity, if locked.
    pub fn identity(&self) -> Option<&IdentityPayload> {
        self.accepted.as_ref()
    }

    /// Variant-specific answer key, if one was fetched on acceptance.
    pub fn variant_key(&self) -> Option<&AnswerKey> {
        self.variant_key.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.accepted.is_some()
    }

    /// Offer a decoded payload.
    ///
    /// On first acceptance with a `variant_id`, the variant key is
    /// fetched best-effort: a fetch failure logs a warning and only
    /// disables correctness highlighting — the identity is accepted
    /// regardless. Once locked, further offers return
    /// [`IdentityOutcome::AlreadyLocked`] without refetching.
    pub fn offer(&mut self, payload: IdentityPayload, keys: &dyn KeyProvider) -> IdentityOutcome {
        if self.accepted.is_some() {
            return IdentityOutcome::AlreadyLocked;
        }
        if payload.exam_id != self.active_exam_id {
            tracing::warn!(
                "identity code belongs to exam '{}' but the active exam is '{}'; discarding",
                payload.exam_id,
                self.active_exam_id
            );
            return IdentityOutcome::ExamMismatch;
        }

        if let Some(variant_id) = payload.variant_id.as_deref() {
            match keys.variant_key(&payload.exam_id, variant_id) {
                Ok(key) => self.variant_key = Some(key),
                Err(err) => tracing::warn!(
                    "variant '{}' answer key fetch failed ({}); correctness highlighting disabled",
                    variant_id,
                    err
                ),
            }
        }

        tracing::info!("identity locked: student '{}'", payload.student_id);
        self.accepted = Some(payload);
        IdentityOutcome::Accepted
    }

    /// Manual fallback: the operator picked the student by hand (upload
    /// mode, or a sheet whose code never decoded). No variant key.
    pub fn lock_manual(&mut self, student_id: impl Into<String>) -> IdentityOutcome {
        if self.accepted.is_some() {
            return IdentityOutcome::AlreadyLocked;
        }
        self.accepted = Some(IdentityPayload {
            exam_id: self.active_exam_id.clone(),
            student_id: student_id.into(),
            variant_id: None,
        });
        IdentityOutcome::Accepted
    }
}
