//! Identity payload wire codec and QR decoding.
//!
//! Each printed sheet carries a QR code in the header encoding a compact
//! JSON object: `{"exam_id": "...", "student_id": "...", "variant_id":
//! "..."}` with `variant_id` optional. Decoding tries both polarities —
//! print and lighting conditions can invert the perceived contrast of
//! the printed code.
//!
//! A frame with no recognizable payload is a *miss* (`None`), not an
//! error; the continuous scan loop simply moves on to the next frame.
//! Acceptance policy (exam mismatch, idempotent locking, key fetching)
//! lives with the caller in [`crate::keys::IdentityLock`].

use image::GrayImage;

/// Decoded sheet identity. Read-only once produced; session-scoped.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdentityPayload {
    pub exam_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
}

/// Wire-side view with every field optional, so a structurally valid
/// payload missing a required field parses and is then rejected as a
/// non-match instead of surfacing a JSON error.
#[derive(Debug, serde::Deserialize)]
struct WirePayload {
    #[serde(default)]
    exam_id: Option<String>,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    variant_id: Option<String>,
}

/// Encode a payload into the wire text printed into the sheet's QR code.
pub fn encode_payload(payload: &IdentityPayload) -> String {
    serde_json::to_string(payload).expect("identity payload always serializes")
}

/// Parse wire text into a payload.
///
/// Returns `None` for non-JSON content or a payload lacking `exam_id` or
/// `student_id` — both are non-matches, not errors.
pub fn parse_payload(text: &str) -> Option<IdentityPayload> {
    let wire: WirePayload = serde_json::from_str(text).ok()?;
    Some(IdentityPayload {
        exam_id: wire.exam_id?,
        student_id: wire.student_id?,
        variant_id: wire.variant_id,
    })
}

/// Decode the identity QR from a grayscale frame.
///
/// Tries normal polarity first, then inverted. Returns the first grid
/// whose content parses into a complete payload.
pub fn decode_identity(gray: &GrayImage) -> Option<IdentityPayload> {
    decode_polarity(gray, false).or_else(|| {
        tracing::trace!("normal polarity missed; trying inverted");
        decode_polarity(gray, true)
    })
}

fn decode_polarity(gray: &GrayImage, inverted: bool) -> Option<IdentityPayload> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
        let v = gray.get_pixel(x as u32, y as u32)[0];
        if inverted {
            255 - v
        } else {
            v
        }
    });
    for grid in prepared.detect_grids() {
        let Ok((_, content)) = grid.decode() else {
            continue;
        };
        if let Some(payload) = parse_payload(&content) {
            return Some(payload);
        }
        tracing::debug!("QR decoded but content is not an identity payload");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::paint_qr;
    use image::{GrayImage, Luma};

    fn payload() -> IdentityPayload {
        IdentityPayload {
            exam_id: "E1".into(),
            student_id: "S1".into(),
            variant_id: Some("V1".into()),
        }
    }

    fn qr_frame(text: &str, dark: u8, light: u8) -> GrayImage {
        let mut img = GrayImage::from_pixel(400, 400, Luma([light]));
        paint_qr(&mut img, text, (60, 60), 8, dark, light);
        img
    }

    #[test]
    fn wire_round_trip() {
        let original = payload();
        let text = encode_payload(&original);
        assert_eq!(parse_payload(&text), Some(original));
    }

    #[test]
    fn wire_omits_absent_variant() {
        let text = encode_payload(&IdentityPayload {
            exam_id: "E1".into(),
            student_id: "S1".into(),
            variant_id: None,
        });
        assert!(!text.contains("variant_id"));
        assert_eq!(parse_payload(&text).unwrap().variant_id, None);
    }

    #[test]
    fn missing_required_field_is_a_non_match() {
        assert!(parse_payload(r#"{"exam_id":"E1"}"#).is_none());
        assert!(parse_payload(r#"{"student_id":"S1","variant_id":"V1"}"#).is_none());
        assert!(parse_payload("not json at all").is_none());
    }

    #[test]
    fn decodes_printed_qr_normal_polarity() {
        let frame = qr_frame(&encode_payload(&payload()), 20, 235);
        assert_eq!(decode_identity(&frame), Some(payload()));
    }

    #[test]
    fn decodes_printed_qr_inverted_polarity() {
        // Dark modules painted light and vice versa; only the inverted
        // pass can read this.
        let frame = qr_frame(&encode_payload(&payload()), 235, 20);
        assert_eq!(decode_identity(&frame), Some(payload()));
    }

    #[test]
    fn blank_frame_is_a_miss() {
        let frame = GrayImage::from_pixel(200, 200, Luma([230]));
        assert_eq!(decode_identity(&frame), None);
    }

    #[test]
    fn qr_with_foreign_content_is_a_miss() {
        let frame = qr_frame("https://example.com/not-an-identity", 20, 235);
        assert_eq!(decode_identity(&frame), None);
    }
}
