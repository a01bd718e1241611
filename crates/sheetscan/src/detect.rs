//! Bubble sampling and answer decision.
//!
//! For every bubble the engine averages grayscale intensity over a disc
//! inset off the printed ring, takes the darkest option per question, and
//! records it when the mean falls strictly below the sensitivity
//! threshold. The whole pass is a pure function of `(gray, subjects,
//! threshold)`: re-running it against a retained buffer with a different
//! threshold is exact and cheap.

use std::collections::BTreeMap;

use image::GrayImage;

use crate::layout::{self, SubjectSpec, OPTION_COUNT};

/// Sensitivity threshold on the `0..=255` luminance scale. A sampled
/// bubble counts as filled when its mean intensity is strictly below the
/// threshold. Below ~100 is strict (only heavy pencil marks register),
/// roughly 100–180 is the optimal band for typical print contrast, above
/// ~180 is permissive (paper shading starts to register).
pub const DEFAULT_THRESHOLD: u8 = 140;

/// Nested answer map: subject order (as string) → question number (as
/// string) → detected option letter. Both keys are small positive
/// integers serialized as strings for map-key compatibility with the
/// persistence collaborator. An absent question key means "unanswered" —
/// there is no explicit null marker.
pub type AnswerMap = BTreeMap<String, BTreeMap<String, char>>;

/// Detection outcome for one capture.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetectionResult {
    /// Detected answers. Subject keys are always present; question keys
    /// only where a mark was detected.
    pub answers: AnswerMap,
    /// `filled / total`, in `[0, 1]`; defined as 0 for an empty sheet.
    /// A fill-rate heuristic, not a correctness measure.
    pub confidence: f32,
    /// Questions with a detected answer.
    pub filled: usize,
    /// Questions across all subjects.
    pub total: usize,
}

impl DetectionResult {
    /// Construct an empty result (no subjects, nothing detected).
    pub fn empty() -> Self {
        Self {
            answers: AnswerMap::new(),
            confidence: 0.0,
            filled: 0,
            total: 0,
        }
    }

    /// Recompute `filled` and `confidence` after an operator edit.
    pub(crate) fn recount(&mut self) {
        self.filled = self.answers.values().map(BTreeMap::len).sum();
        self.confidence = if self.total == 0 {
            0.0
        } else {
            self.filled as f32 / self.total as f32
        };
    }
}

/// Option letter for a 0-based option index (`0` → `A`).
#[inline]
pub fn option_letter(option: u32) -> char {
    (b'A' + option as u8) as char
}

/// 0-based option index for a printed letter, if the sheet carries it.
#[inline]
pub fn option_index(letter: char) -> Option<u32> {
    let idx = (letter as u32).checked_sub('A' as u32)?;
    (idx < OPTION_COUNT).then_some(idx)
}

/// Detect marked bubbles on a canonical grayscale buffer.
///
/// Subjects are processed ascending by `order`; their position in that
/// ordering is the geometry subject index. Ties between equally dark
/// options resolve to the first option in iteration order (`A` before
/// `B` …) — a deliberately preserved heuristic that cannot distinguish a
/// genuine double-mark from one mark plus noise.
pub fn detect_marks(gray: &GrayImage, subjects: &[SubjectSpec], threshold: u8) -> DetectionResult {
    let mut ordered: Vec<&SubjectSpec> = subjects.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let radius = layout::sample_radius_px();
    let mut answers = AnswerMap::new();
    let mut filled = 0usize;
    let mut total = 0usize;

    for (subject_index, subject) in ordered.iter().enumerate() {
        let mut subject_answers = BTreeMap::new();
        for question in 1..=subject.question_count {
            total += 1;
            let mut darkest: Option<(u32, f32)> = None;
            for option in 0..OPTION_COUNT {
                let [cx, cy] =
                    layout::bubble_center(subject_index, question, option, subject.question_count);
                let Some(mean) = mean_disc_intensity(gray, cx, cy, radius) else {
                    continue;
                };
                // Strict comparison keeps the first option on an exact tie.
                if darkest.is_none_or(|(_, best)| mean < best) {
                    darkest = Some((option, mean));
                }
            }
            if let Some((option, mean)) = darkest {
                if mean < threshold as f32 {
                    subject_answers.insert(question.to_string(), option_letter(option));
                    filled += 1;
                }
            }
        }
        tracing::debug!(
            "subject {} ('{}'): {}/{} answered",
            subject.order,
            subject.name,
            subject_answers.len(),
            subject.question_count
        );
        answers.insert(subject.order.to_string(), subject_answers);
    }

    let confidence = if total == 0 {
        0.0
    } else {
        filled as f32 / total as f32
    };
    tracing::info!("{filled}/{total} questions answered (confidence {confidence:.3})");

    DetectionResult {
        answers,
        confidence,
        filled,
        total,
    }
}

/// Mean grayscale intensity over the disc of `radius` around `(cx, cy)`,
/// on the `0..=255` scale. Out-of-bounds pixels are skipped, not
/// zero-filled; a disc with no in-bounds pixels yields `None`.
fn mean_disc_intensity(gray: &GrayImage, cx: f32, cy: f32, radius: f32) -> Option<f32> {
    let (w, h) = gray.dimensions();
    let x_lo = (cx - radius).floor().max(0.0) as u32;
    let y_lo = (cy - radius).floor().max(0.0) as u32;
    let x_hi = ((cx + radius).ceil() as i64).min(w as i64 - 1);
    let y_hi = ((cy + radius).ceil() as i64).min(h as i64 - 1);
    if x_hi < x_lo as i64 || y_hi < y_lo as i64 {
        return None;
    }

    let r2 = radius * radius;
    let mut sum = 0.0f64;
    let mut count = 0u32;
    for y in y_lo..=y_hi as u32 {
        for x in x_lo..=x_hi as u32 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= r2 {
                sum += gray.get_pixel(x, y)[0] as f64;
                count += 1;
            }
        }
    }
    (count > 0).then(|| (sum / count as f64) as f32)
}
