//! Image acquisition: one seam over continuous devices and static files.
//!
//! Device IO itself (webcam, scanner) lives behind [`FrameSource`]; the
//! implementor owns the device handle, and dropping the source releases
//! it. Acquisition never retries on its own — a failed acquire surfaces a
//! typed [`AcquireError`] and the caller decides.

use std::path::Path;

use image::RgbaImage;

use crate::error::AcquireError;

/// A raw RGBA capture at its native resolution.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap a raw RGBA byte vector, validating its declared dimensions.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, AcquireError> {
        if width == 0 || height == 0 {
            return Err(AcquireError::ZeroSized { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(AcquireError::BufferSize {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Wrap a decoded [`RgbaImage`] without copying.
    pub fn from_rgba_image(img: RgbaImage) -> Result<Self, AcquireError> {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw())
    }

    /// View the buffer as an [`RgbaImage`] (clones the pixel data).
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .expect("dimensions validated at construction")
    }
}

/// Unified frame producer.
///
/// A continuous device returns a snapshot of its current frame on every
/// call; a static file returns the same decoded buffer each time. The
/// active scan session (or identity scanner) owns its source exclusively;
/// no other component reads the device.
pub trait FrameSource {
    fn acquire(&mut self) -> Result<PixelBuffer, AcquireError>;
}

/// Static-file source: decoded once at open, served unchanged thereafter.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    buffer: PixelBuffer,
}

impl StillImageSource {
    /// Decode an image file. Decode failures surface as
    /// [`AcquireError::Decode`].
    pub fn open(path: &Path) -> Result<Self, AcquireError> {
        let img = image::open(path)?.to_rgba8();
        tracing::info!(
            "loaded {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        );
        Ok(Self {
            buffer: PixelBuffer::from_rgba_image(img)?,
        })
    }

    /// Wrap an already-decoded buffer (uploads arriving over the wire).
    pub fn from_buffer(buffer: PixelBuffer) -> Self {
        Self { buffer }
    }
}

impl FrameSource for StillImageSource {
    fn acquire(&mut self) -> Result<PixelBuffer, AcquireError> {
        Ok(self.buffer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_validates_length() {
        assert!(PixelBuffer::new(2, 2, vec![0u8; 16]).is_ok());
        assert!(matches!(
            PixelBuffer::new(2, 2, vec![0u8; 15]),
            Err(AcquireError::BufferSize { expected: 16, .. })
        ));
        assert!(matches!(
            PixelBuffer::new(0, 4, Vec::new()),
            Err(AcquireError::ZeroSized { .. })
        ));
    }

    #[test]
    fn still_source_returns_identical_frames() {
        let buffer = PixelBuffer::new(3, 2, vec![7u8; 24]).unwrap();
        let mut source = StillImageSource::from_buffer(buffer);
        let a = source.acquire().unwrap();
        let b = source.acquire().unwrap();
        assert_eq!(a.rgba, b.rgba);
        assert_eq!((a.width, a.height), (3, 2));
    }
}
