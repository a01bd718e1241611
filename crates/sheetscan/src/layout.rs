//! Printed-page geometry contract.
//!
//! The millimetre constants below are shared verbatim with the
//! sheet-printing collaborator: the generator lays bubbles out with them
//! and the detector samples at the positions they imply. Any change
//! invalidates sheets already printed under the old values — there is no
//! versioning beyond "generator and detector must read the same numbers".
//!
//! The canonical page is ISO A4 portrait rasterized at a fixed 8 px/mm;
//! all downstream sampling happens in that pixel space regardless of the
//! capture resolution.

use std::ops::RangeInclusive;

use crate::error::LayoutError;

/// Page width in mm (ISO A4 portrait).
pub const PAGE_W_MM: f32 = 210.0;
/// Page height in mm (ISO A4 portrait).
pub const PAGE_H_MM: f32 = 297.0;
/// Canonical rasterization scale.
pub const PX_PER_MM: f32 = 8.0;

/// Outer page margin.
pub const MARGIN_MM: f32 = 10.0;
/// Header band: exam title plus the identity QR zone.
pub const HEADER_H_MM: f32 = 30.0;
/// Instruction line under the header.
pub const INFO_H_MM: f32 = 10.0;
/// Subject name row at the top of each subject block.
pub const SUBJECT_TITLE_H_MM: f32 = 8.0;
/// Fixed height of one subject block. Fixed so a block's origin depends
/// only on the subject index, never on other subjects' question counts.
pub const SUBJECT_BLOCK_H_MM: f32 = 58.0;
/// Height of one question row.
pub const ROW_H_MM: f32 = 7.0;
/// Question-number label width at the start of each column.
pub const LABEL_W_MM: f32 = 10.0;
/// Printed bubble diameter.
pub const BUBBLE_DIAMETER_MM: f32 = 5.0;
/// Horizontal gap between adjacent bubbles.
pub const BUBBLE_GAP_MM: f32 = 2.0;

/// Answer columns per subject block.
pub const ANSWER_COLUMNS: u32 = 2;
/// Answer options per question (`A`, `B`, …).
pub const OPTION_COUNT: u32 = 4;

/// Sampling radius as a fraction of the bubble radius. Inset so the
/// sampled disc stays off the printed ring itself.
pub const SAMPLE_INSET_RATIO: f32 = 0.7;

/// Canonical raster width in pixels (`PAGE_W_MM * PX_PER_MM`).
pub const CANONICAL_W: u32 = 1680;
/// Canonical raster height in pixels (`PAGE_H_MM * PX_PER_MM`).
pub const CANONICAL_H: u32 = 2376;

/// One subject on the sheet, as configured by the exam collaborator.
///
/// `order` is significant and stable: subject blocks are stacked on the
/// page ascending by it, and it is the outer key of every answer map.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubjectSpec {
    pub order: u32,
    pub name: String,
    pub question_count: u32,
    pub points_per_question: f32,
}

/// Convert millimetres to canonical pixels.
#[inline]
pub fn px(mm: f32) -> f32 {
    mm * PX_PER_MM
}

/// Printed bubble radius in canonical pixels.
#[inline]
pub fn bubble_radius_px() -> f32 {
    px(BUBBLE_DIAMETER_MM) / 2.0
}

/// Intensity-sampling radius in canonical pixels (inset off the ring).
#[inline]
pub fn sample_radius_px() -> f32 {
    bubble_radius_px() * SAMPLE_INSET_RATIO
}

/// Rows per answer column for a subject with `question_count` questions.
#[inline]
pub fn rows_per_column(question_count: u32) -> u32 {
    question_count.div_ceil(ANSWER_COLUMNS)
}

/// Question numbers printed in `column` (0-indexed) of a subject block.
///
/// Column `c` covers `[c*rows + 1, min((c+1)*rows, n)]` with
/// `rows = ceil(n / ANSWER_COLUMNS)`. Trailing columns may be underfull
/// or empty (`None`) when `n` does not divide evenly; that is part of the
/// printed contract, not an error.
pub fn column_questions(question_count: u32, column: u32) -> Option<RangeInclusive<u32>> {
    if question_count == 0 || column >= ANSWER_COLUMNS {
        return None;
    }
    let rows = rows_per_column(question_count);
    let start = column * rows + 1;
    if start > question_count {
        return None;
    }
    let end = (start + rows - 1).min(question_count);
    Some(start..=end)
}

/// Center of one bubble in canonical pixels.
///
/// The single shared lookup for both the print-generation path and the
/// detector: `subject_index` is the subject's 0-based position on the
/// page (ascending `order`), `question` is 1-based, `option` is 0-based
/// (`0` = `A`).
pub fn bubble_center(
    subject_index: usize,
    question: u32,
    option: u32,
    question_count: u32,
) -> [f32; 2] {
    let rows = rows_per_column(question_count).max(1);
    let col = (question - 1) / rows;
    let row = (question - 1) % rows;

    let col_w_mm = (PAGE_W_MM - 2.0 * MARGIN_MM) / ANSWER_COLUMNS as f32;
    let x_mm = MARGIN_MM
        + col as f32 * col_w_mm
        + LABEL_W_MM
        + option as f32 * (BUBBLE_DIAMETER_MM + BUBBLE_GAP_MM)
        + BUBBLE_DIAMETER_MM / 2.0;

    let y_mm = MARGIN_MM
        + HEADER_H_MM
        + INFO_H_MM
        + subject_index as f32 * SUBJECT_BLOCK_H_MM
        + SUBJECT_TITLE_H_MM
        + row as f32 * ROW_H_MM
        + ROW_H_MM / 2.0;

    [px(x_mm), px(y_mm)]
}

/// Maximum question rows that fit one column of a subject block.
pub fn max_rows_per_column() -> u32 {
    ((SUBJECT_BLOCK_H_MM - SUBJECT_TITLE_H_MM) / ROW_H_MM) as u32
}

/// Maximum subject blocks that fit between the instruction line and the
/// bottom margin.
pub fn max_subject_blocks() -> usize {
    let content_h = PAGE_H_MM - 2.0 * MARGIN_MM - HEADER_H_MM - INFO_H_MM;
    (content_h / SUBJECT_BLOCK_H_MM) as usize
}

/// Check that a subject configuration physically fits the printed layout.
///
/// Called once per scan session; the same check gates the print path, so
/// a sheet that could be printed can always be scanned.
pub fn validate_subjects(subjects: &[SubjectSpec]) -> Result<(), LayoutError> {
    if subjects.is_empty() {
        return Err(LayoutError::NoSubjects);
    }
    if OPTION_COUNT > 26 {
        return Err(LayoutError::OptionsOverflow(OPTION_COUNT));
    }
    if subjects.len() > max_subject_blocks() {
        return Err(LayoutError::TooManySubjects {
            count: subjects.len(),
            max: max_subject_blocks(),
        });
    }

    let mut seen = std::collections::BTreeSet::new();
    for subject in subjects {
        if !seen.insert(subject.order) {
            return Err(LayoutError::DuplicateOrder(subject.order));
        }
        if subject.question_count == 0 {
            return Err(LayoutError::EmptySubject {
                name: subject.name.clone(),
            });
        }
        let rows = rows_per_column(subject.question_count);
        if rows > max_rows_per_column() {
            return Err(LayoutError::SubjectOverflow {
                name: subject.name.clone(),
                rows,
                max_rows: max_rows_per_column(),
            });
        }
    }
    Ok(())
}
