//! Shared test utilities: synthetic sheet painting.

use image::{GrayImage, Luma};

use crate::layout::{self, CANONICAL_H, CANONICAL_W};

/// Canonical-sized uniform sheet (light paper).
pub(crate) fn blank_sheet(paper: u8) -> GrayImage {
    GrayImage::from_pixel(CANONICAL_W, CANONICAL_H, Luma([paper]))
}

/// Paint a filled bubble: a disc of the printed bubble radius at `center`.
pub(crate) fn fill_bubble(img: &mut GrayImage, center: [f32; 2], value: u8) {
    fill_disc(img, center, layout::bubble_radius_px(), value);
}

pub(crate) fn fill_disc(img: &mut GrayImage, center: [f32; 2], radius: f32, value: u8) {
    let (w, h) = img.dimensions();
    let r2 = radius * radius;
    let x_lo = (center[0] - radius).floor().max(0.0) as u32;
    let y_lo = (center[1] - radius).floor().max(0.0) as u32;
    for y in y_lo..h.min((center[1] + radius).ceil() as u32 + 1) {
        for x in x_lo..w.min((center[0] + radius).ceil() as u32 + 1) {
            let dx = x as f32 - center[0];
            let dy = y as f32 - center[1];
            if dx * dx + dy * dy <= r2 {
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

/// Paint a QR code for `text` with its quiet zone, top-left at `origin`.
///
/// `dark`/`light` let tests paint either polarity. Modules are
/// `module_px` square; the quiet zone is the standard 4 modules.
pub(crate) fn paint_qr(
    img: &mut GrayImage,
    text: &str,
    origin: (u32, u32),
    module_px: u32,
    dark: u8,
    light: u8,
) {
    let code = qrcode::QrCode::new(text.as_bytes()).expect("payload fits a QR code");
    let width = code.width() as u32;
    let colors = code.to_colors();
    let quiet = 4 * module_px;
    let span = width * module_px + 2 * quiet;

    for y in 0..span {
        for x in 0..span {
            let px = origin.0 + x;
            let py = origin.1 + y;
            if px >= img.width() || py >= img.height() {
                continue;
            }
            let value = if x < quiet || y < quiet || x >= quiet + width * module_px || y >= quiet + width * module_px
            {
                light
            } else {
                let mx = (x - quiet) / module_px;
                let my = (y - quiet) / module_px;
                match colors[(my * width + mx) as usize] {
                    qrcode::Color::Dark => dark,
                    qrcode::Color::Light => light,
                }
            };
            img.put_pixel(px, py, Luma([value]));
        }
    }
}
