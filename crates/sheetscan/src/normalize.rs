//! Canonical-space normalization.
//!
//! A raw capture is stretched onto the canonical A4 raster with a direct,
//! non-aspect-preserving resample. This rests on the operational
//! assumption that the capture is already roughly page-shaped (the
//! acquisition UI guides the operator to frame the sheet edge-to-edge).
//!
//! Known failure mode, by design: a poorly framed capture degrades every
//! downstream bubble sample and nothing here detects or corrects it —
//! there is no perspective correction, rotation detection, or cropping.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};

use crate::acquire::PixelBuffer;
use crate::layout::{CANONICAL_H, CANONICAL_W};

/// A capture resampled to the canonical page raster.
#[derive(Debug, Clone)]
pub struct CanonicalBuffer {
    /// Canonical-sized RGBA (retained for operator display).
    pub rgba: RgbaImage,
    /// BT.601 grayscale derivation of `rgba`; all sampling reads this.
    pub gray: GrayImage,
}

/// Resample a raw capture onto the canonical raster and derive grayscale.
pub fn normalize(raw: &PixelBuffer) -> CanonicalBuffer {
    let src = raw.to_rgba_image();
    let rgba = imageops::resize(&src, CANONICAL_W, CANONICAL_H, FilterType::Triangle);
    let gray = luma601(&rgba);
    CanonicalBuffer { rgba, gray }
}

/// Grayscale a raw capture at its native resolution (no resample).
///
/// The identity scan loop reads QR codes off native frames: resampling
/// can destroy module edges, and the QR decoder does not need canonical
/// coordinates.
pub fn grayscale(raw: &PixelBuffer) -> GrayImage {
    let mut gray = GrayImage::new(raw.width, raw.height);
    for (pixel, chunk) in gray.pixels_mut().zip(raw.rgba.chunks_exact(4)) {
        pixel[0] = luma(chunk[0], chunk[1], chunk[2]);
    }
    gray
}

/// ITU-R BT.601 luminance: `0.299 R + 0.587 G + 0.114 B`.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().min(255.0) as u8
}

fn luma601(rgba: &RgbaImage) -> GrayImage {
    let (w, h) = rgba.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (gray_px, src_px) in gray.pixels_mut().zip(rgba.pixels()) {
        gray_px[0] = luma(src_px[0], src_px[1], src_px[2]);
    }
    gray
}
