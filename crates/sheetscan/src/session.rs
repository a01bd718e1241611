//! Review & correction state machine.
//!
//! A [`ScanSession`] owns everything one capture-to-save cycle touches:
//! the retained raw buffer, the canonical resample, the current
//! sensitivity threshold, the current detection, and the identity lock.
//! Sessions are independent — concurrent operators never share state.
//!
//! ```text
//! Capture --process_capture--> Review --save--> Saved
//!    ^                           |
//!    +---------- retake --------+
//! ```
//!
//! Correctness verdicts are advisory only: they compare the current
//! answers against the resolved answer key for the operator's benefit and
//! have zero effect on what gets persisted.

use std::collections::BTreeMap;

use crate::acquire::PixelBuffer;
use crate::detect::{self, DetectionResult, DEFAULT_THRESHOLD};
use crate::error::{LayoutError, SaveError, SessionError};
use crate::identity::IdentityPayload;
use crate::keys::{AnswerKey, IdentityLock, IdentityOutcome, KeyProvider};
use crate::layout::{self, SubjectSpec};
use crate::normalize::{self, CanonicalBuffer};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Acquiring or awaiting input; no detection exists.
    Capture,
    /// A detection exists and is open for operator correction.
    Review,
    /// Terminal: the result was handed to the persistence collaborator.
    Saved,
}

/// Advisory correctness category for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
    /// No answer key available for this question.
    Unknown,
}

/// How a persisted result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Produced by this scanning pipeline (operator edits included).
    Scanned,
    /// Entered by hand in the score-entry UI (outside this crate).
    Manual,
}

/// The finalized record handed to the persistence collaborator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanRecord {
    pub exam_id: String,
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub answers: detect::AnswerMap,
    pub source: ResultSource,
}

/// Persistence collaborator. Called exactly once per successful save;
/// an error blocks the transition and nothing is partially persisted.
pub trait ResultSink {
    fn save_scan(&mut self, record: &ScanRecord) -> Result<(), SaveError>;
}

/// One capture-review-save cycle.
pub struct ScanSession {
    subjects: Vec<SubjectSpec>,
    threshold: u8,
    raw: Option<PixelBuffer>,
    canonical: Option<CanonicalBuffer>,
    detection: Option<DetectionResult>,
    identity: IdentityLock,
    static_key: Option<AnswerKey>,
    state: ScanState,
}

impl ScanSession {
    /// Open a session for one exam. `static_key` is the non-variant
    /// answer key, when the exam has one; a fetched variant key shadows
    /// it for highlighting.
    pub fn new(
        exam_id: impl Into<String>,
        subjects: Vec<SubjectSpec>,
        static_key: Option<AnswerKey>,
    ) -> Result<Self, LayoutError> {
        layout::validate_subjects(&subjects)?;
        Ok(Self {
            subjects,
            threshold: DEFAULT_THRESHOLD,
            raw: None,
            canonical: None,
            detection: None,
            identity: IdentityLock::new(exam_id),
            static_key,
            state: ScanState::Capture,
        })
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn subjects(&self) -> &[SubjectSpec] {
        &self.subjects
    }

    /// Current detection, if the session has reached Review.
    pub fn detection(&self) -> Option<&DetectionResult> {
        self.detection.as_ref()
    }

    /// The locked identity, if resolved.
    pub fn identity(&self) -> Option<&IdentityPayload> {
        self.identity.identity()
    }

    /// Run the one-shot detection pipeline on a fresh capture and enter
    /// Review. The raw buffer is retained for reprocessing.
    pub fn process_capture(
        &mut self,
        raw: PixelBuffer,
    ) -> Result<&DetectionResult, SessionError> {
        self.expect_state(ScanState::Capture)?;
        let canonical = normalize::normalize(&raw);
        let detection = detect::detect_marks(&canonical.gray, &self.subjects, self.threshold);
        self.raw = Some(raw);
        self.canonical = Some(canonical);
        self.detection = Some(detection);
        self.state = ScanState::Review;
        Ok(self.detection.as_ref().expect("detection just stored"))
    }

    /// Adjust the sensitivity threshold. Takes effect on the next
    /// [`Self::process_capture`] or [`Self::reprocess`].
    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    /// Re-run detection against the retained capture with the current
    /// threshold, discarding any operator edits.
    pub fn reprocess(&mut self) -> Result<&DetectionResult, SessionError> {
        self.expect_state(ScanState::Review)?;
        let canonical = self
            .canonical
            .as_ref()
            .ok_or(SessionError::NoRetainedCapture)?;
        self.detection = Some(detect::detect_marks(
            &canonical.gray,
            &self.subjects,
            self.threshold,
        ));
        Ok(self.detection.as_ref().expect("detection just stored"))
    }

    /// Feed a decoded identity payload into the session's lock.
    pub fn offer_identity(
        &mut self,
        payload: IdentityPayload,
        keys: &dyn KeyProvider,
    ) -> IdentityOutcome {
        self.identity.offer(payload, keys)
    }

    /// Manual fallback identity selection.
    pub fn set_manual_student(&mut self, student_id: impl Into<String>) -> IdentityOutcome {
        self.identity.lock_manual(student_id)
    }

    /// Toggle one answer during review: selecting the current letter
    /// clears the question to unanswered, any other letter overwrites it.
    pub fn toggle_answer(
        &mut self,
        subject_order: u32,
        question: u32,
        letter: char,
    ) -> Result<(), SessionError> {
        self.expect_state(ScanState::Review)?;
        let subject = self
            .subjects
            .iter()
            .find(|s| s.order == subject_order)
            .ok_or(SessionError::UnknownQuestion {
                subject_order,
                question,
            })?;
        if question == 0 || question > subject.question_count {
            return Err(SessionError::UnknownQuestion {
                subject_order,
                question,
            });
        }
        if detect::option_index(letter).is_none() {
            return Err(SessionError::UnknownOption(letter));
        }

        let detection = self
            .detection
            .as_mut()
            .ok_or(SessionError::NoRetainedCapture)?;
        let subject_answers = detection
            .answers
            .entry(subject_order.to_string())
            .or_default();
        let key = question.to_string();
        if subject_answers.get(&key) == Some(&letter) {
            subject_answers.remove(&key);
        } else {
            subject_answers.insert(key, letter);
        }
        detection.recount();
        Ok(())
    }

    /// Advisory correct/incorrect/unknown per question, against the
    /// variant key when fetched, else the exam's static key, else
    /// Unknown. Never affects persistence.
    pub fn verdicts(&self) -> BTreeMap<String, BTreeMap<String, Verdict>> {
        let key = self.identity.variant_key().or(self.static_key.as_ref());
        let empty = detect::AnswerMap::new();
        let answers = self
            .detection
            .as_ref()
            .map(|d| &d.answers)
            .unwrap_or(&empty);

        let mut out = BTreeMap::new();
        for subject in &self.subjects {
            let order_key = subject.order.to_string();
            let subject_key = key.and_then(|k| k.get(&order_key));
            let subject_answers = answers.get(&order_key);
            let mut verdicts = BTreeMap::new();
            for question in 1..=subject.question_count {
                let question_key = question.to_string();
                let verdict = match subject_key.and_then(|k| k.get(&question_key)) {
                    None => Verdict::Unknown,
                    Some(correct) => {
                        let answered = subject_answers.and_then(|a| a.get(&question_key));
                        if answered == Some(correct) {
                            Verdict::Correct
                        } else {
                            Verdict::Incorrect
                        }
                    }
                };
                verdicts.insert(question_key, verdict);
            }
            out.insert(order_key, verdicts);
        }
        out
    }

    /// Discard the current detection and buffers and go back to Capture.
    /// The identity lock survives a retake.
    pub fn retake(&mut self) -> Result<(), SessionError> {
        self.expect_state(ScanState::Review)?;
        self.raw = None;
        self.canonical = None;
        self.detection = None;
        self.state = ScanState::Capture;
        tracing::info!("capture discarded; session back to Capture");
        Ok(())
    }

    /// Finalize the review and hand the record to persistence.
    ///
    /// Rejected with [`SaveError::IdentityUnresolved`] when no identity
    /// is locked — a user-facing validation failure, never a silent
    /// no-op.
    pub fn save(&mut self, sink: &mut dyn ResultSink) -> Result<(), SaveError> {
        if self.state != ScanState::Review {
            return Err(SaveError::NotInReview);
        }
        let detection = self.detection.as_ref().ok_or(SaveError::NotInReview)?;
        let identity = self
            .identity
            .identity()
            .ok_or(SaveError::IdentityUnresolved)?;

        let record = ScanRecord {
            exam_id: identity.exam_id.clone(),
            student_id: identity.student_id.clone(),
            variant_id: identity.variant_id.clone(),
            answers: detection.answers.clone(),
            source: ResultSource::Scanned,
        };
        sink.save_scan(&record)?;
        self.state = ScanState::Saved;
        tracing::info!(
            "scan saved: exam '{}', student '{}'",
            record.exam_id,
            record.student_id
        );
        Ok(())
    }

    fn expect_state(&self, expected: ScanState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::WrongState {
                expected,
                actual: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyFetchError;
    use crate::layout::bubble_center;
    use crate::test_utils::{blank_sheet, fill_bubble};
    use image::GrayImage;

    struct NoKeys;
    impl KeyProvider for NoKeys {
        fn variant_key(&self, _: &str, _: &str) -> Result<AnswerKey, KeyFetchError> {
            Err(KeyFetchError::Unavailable("no variants".into()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        records: Vec<ScanRecord>,
    }
    impl ResultSink for RecordingSink {
        fn save_scan(&mut self, record: &ScanRecord) -> Result<(), SaveError> {
            self.records.push(record.clone());
            Ok(())
        }
    }

    fn subjects() -> Vec<SubjectSpec> {
        vec![SubjectSpec {
            order: 1,
            name: "math".into(),
            question_count: 7,
            points_per_question: 2.0,
        }]
    }

    /// Canonical sheet with Q3=C dark; wrapped into a raw RGBA buffer.
    fn marked_capture() -> PixelBuffer {
        let mut sheet = blank_sheet(220);
        fill_bubble(&mut sheet, bubble_center(0, 3, 2, 7), 40);
        gray_to_buffer(&sheet)
    }

    fn gray_to_buffer(gray: &GrayImage) -> PixelBuffer {
        let mut rgba = Vec::with_capacity(gray.as_raw().len() * 4);
        for v in gray.as_raw() {
            rgba.extend_from_slice(&[*v, *v, *v, 255]);
        }
        PixelBuffer::new(gray.width(), gray.height(), rgba).unwrap()
    }

    fn payload() -> IdentityPayload {
        IdentityPayload {
            exam_id: "E1".into(),
            student_id: "S1".into(),
            variant_id: None,
        }
    }

    #[test]
    fn capture_review_save_happy_path() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        assert_eq!(session.state(), ScanState::Capture);

        session.set_threshold(128);
        let detection = session.process_capture(marked_capture()).unwrap();
        assert_eq!(detection.answers["1"]["3"], 'C');
        assert_eq!(session.state(), ScanState::Review);

        assert_eq!(
            session.offer_identity(payload(), &NoKeys),
            IdentityOutcome::Accepted
        );

        let mut sink = RecordingSink::default();
        session.save(&mut sink).unwrap();
        assert_eq!(session.state(), ScanState::Saved);

        let record = &sink.records[0];
        assert_eq!(record.student_id, "S1");
        assert_eq!(record.answers["1"]["3"], 'C');
        assert_eq!(record.source, ResultSource::Scanned);
    }

    #[test]
    fn save_without_identity_is_rejected() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();

        let mut sink = RecordingSink::default();
        assert!(matches!(
            session.save(&mut sink),
            Err(SaveError::IdentityUnresolved)
        ));
        assert!(sink.records.is_empty());
        assert_eq!(session.state(), ScanState::Review);

        // Manual fallback unblocks the save.
        session.set_manual_student("S7");
        session.save(&mut sink).unwrap();
        assert_eq!(sink.records[0].student_id, "S7");
    }

    #[test]
    fn save_outside_review_is_rejected() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        let mut sink = RecordingSink::default();
        assert!(matches!(session.save(&mut sink), Err(SaveError::NotInReview)));
    }

    #[test]
    fn mismatched_exam_leaves_identity_unset() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        let foreign = IdentityPayload {
            exam_id: "OTHER".into(),
            student_id: "S1".into(),
            variant_id: None,
        };
        assert_eq!(
            session.offer_identity(foreign, &NoKeys),
            IdentityOutcome::ExamMismatch
        );
        assert!(session.identity().is_none());
    }

    #[test]
    fn toggle_clears_and_overwrites() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();

        // Different letter overwrites.
        session.toggle_answer(1, 3, 'A').unwrap();
        assert_eq!(session.detection().unwrap().answers["1"]["3"], 'A');
        // Same letter clears.
        session.toggle_answer(1, 3, 'A').unwrap();
        assert!(!session.detection().unwrap().answers["1"].contains_key("3"));
        assert_eq!(session.detection().unwrap().filled, 0);
        // Selecting on an unanswered question fills it.
        session.toggle_answer(1, 5, 'D').unwrap();
        assert_eq!(session.detection().unwrap().answers["1"]["5"], 'D');

        assert!(matches!(
            session.toggle_answer(9, 1, 'A'),
            Err(SessionError::UnknownQuestion { .. })
        ));
        assert!(matches!(
            session.toggle_answer(1, 8, 'A'),
            Err(SessionError::UnknownQuestion { .. })
        ));
        assert!(matches!(
            session.toggle_answer(1, 1, 'Z'),
            Err(SessionError::UnknownOption('Z'))
        ));
    }

    #[test]
    fn retake_discards_detection_but_keeps_identity() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();
        session.offer_identity(payload(), &NoKeys);

        session.retake().unwrap();
        assert_eq!(session.state(), ScanState::Capture);
        assert!(session.detection().is_none());
        assert!(session.identity().is_some());

        // Reprocess needs a retained capture, which retake dropped.
        assert!(matches!(
            session.reprocess(),
            Err(SessionError::WrongState { .. })
        ));
    }

    #[test]
    fn reprocess_applies_new_threshold_to_retained_buffer() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();
        assert_eq!(session.detection().unwrap().filled, 1);

        // Stricter than the 40-intensity mark: nothing registers.
        session.set_threshold(30);
        session.reprocess().unwrap();
        assert_eq!(session.detection().unwrap().filled, 0);

        session.set_threshold(128);
        session.reprocess().unwrap();
        assert_eq!(session.detection().unwrap().filled, 1);
    }

    #[test]
    fn verdicts_prefer_variant_key_and_never_touch_answers() {
        let mut static_key = AnswerKey::new();
        static_key
            .entry("1".into())
            .or_default()
            .insert("3".into(), 'C');

        let mut session = ScanSession::new("E1", subjects(), Some(static_key)).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();

        let verdicts = session.verdicts();
        assert_eq!(verdicts["1"]["3"], Verdict::Correct);
        // No key entry for question 1: unknown, not incorrect.
        assert_eq!(verdicts["1"]["1"], Verdict::Unknown);

        // Toggling the answer flips the verdict, not the key.
        session.toggle_answer(1, 3, 'B').unwrap();
        assert_eq!(session.verdicts()["1"]["3"], Verdict::Incorrect);
    }

    #[test]
    fn verdicts_without_any_key_are_unknown() {
        let mut session = ScanSession::new("E1", subjects(), None).unwrap();
        session.set_threshold(128);
        session.process_capture(marked_capture()).unwrap();
        let verdicts = session.verdicts();
        assert!(verdicts["1"].values().all(|v| *v == Verdict::Unknown));
    }
}
