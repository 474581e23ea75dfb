//! Uncompressed-frame pixel conversion and blit.

use crate::frame::{bytes_per_row, FourCc, VideoFrame};
use crate::native::Surface;

#[derive(Debug)]
pub enum RenderError {
    UnsupportedPixelFormat(FourCc),
    InvalidBuffer { needed: usize, available: usize },
    InvalidStride { stride: i32, min_row_bytes: usize },
    NoSurface,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::UnsupportedPixelFormat(fourcc) => write!(f, "unsupported pixel format {fourcc:?}"),
            RenderError::InvalidBuffer { needed, available } => {
                write!(f, "buffer too small: need {needed}, have {available}")
            }
            RenderError::InvalidStride { stride, min_row_bytes } => {
                write!(f, "stride {stride} smaller than minimum row bytes {min_row_bytes}")
            }
            RenderError::NoSurface => write!(f, "no surface bound"),
        }
    }
}

/// Converts a borrowed uncompressed frame to RGBA8 and blits it to a
/// `Surface`. Keeps a destination backing buffer and per-row scratch buffer,
/// reallocated only when dimensions change.
pub struct Renderer {
    width: u32,
    height: u32,
    backing: Vec<u8>,
}

impl Renderer {
    pub fn new() -> Self {
        Self { width: 0, height: 0, backing: Vec::new() }
    }

    fn ensure_backing(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.backing = vec![0u8; (width as usize) * (height as usize) * 4];
        }
    }

    /// Writes exactly `width * height * 4` RGBA bytes into the backing
    /// buffer, then locks the surface and copies them in, always unlocking
    /// on every exit path.
    pub fn render(&mut self, frame: &VideoFrame<'_>, surface: &dyn Surface) -> Result<(), RenderError> {
        convert_to_rgba(frame, &mut self.backing, &mut self.width, &mut self.height)?;

        match surface.lock_canvas(self.width, self.height) {
            Some(dst) => {
                let n = dst.len().min(self.backing.len());
                dst[..n].copy_from_slice(&self.backing[..n]);
                surface.unlock();
                Ok(())
            }
            None => {
                surface.unlock();
                Err(RenderError::NoSurface)
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure conversion entry point, split out from `Renderer::render` so tests
/// can assert on exact byte counts without a `Surface`.
pub fn convert_to_rgba(frame: &VideoFrame<'_>, out: &mut Vec<u8>, cached_w: &mut u32, cached_h: &mut u32) -> Result<(), RenderError> {
    let width = frame.width;
    let height = frame.height;
    if *cached_w != width || *cached_h != height || out.len() != (width as usize) * (height as usize) * 4 {
        *out = vec![0u8; (width as usize) * (height as usize) * 4];
        *cached_w = width;
        *cached_h = height;
    }

    let min_row_bytes = bytes_per_row(frame.fourcc, width);
    let stride = resolve_stride(frame.line_stride_bytes, min_row_bytes)?;
    let data = frame.data();

    let abs_stride = stride.unsigned_abs() as usize;
    let required = if height == 0 { 0 } else { (height as usize - 1) * abs_stride + min_row_bytes };
    if data.len() < required {
        return Err(RenderError::InvalidBuffer { needed: required, available: data.len() });
    }

    for row in 0..height as usize {
        let src_row = if stride < 0 { (height as usize - 1 - row) * abs_stride } else { row * abs_stride };
        let src = &data[src_row..src_row + min_row_bytes.max(1).min(data.len() - src_row)];
        let dst = &mut out[row * width as usize * 4..(row + 1) * width as usize * 4];
        convert_row(frame.fourcc, src, dst, width)?;
    }

    Ok(())
}

/// Zero stride means tightly packed; positive stride smaller than the
/// minimum row size is rejected.
fn resolve_stride(declared: i32, min_row_bytes: usize) -> Result<i32, RenderError> {
    if declared == 0 {
        return Ok(min_row_bytes as i32);
    }
    if declared.unsigned_abs() as usize >= min_row_bytes {
        Ok(declared)
    } else {
        Err(RenderError::InvalidStride { stride: declared, min_row_bytes })
    }
}

fn convert_row(fourcc: FourCc, src: &[u8], dst: &mut [u8], width: u32) -> Result<(), RenderError> {
    match fourcc {
        FourCc::Bgra => {
            for x in 0..width as usize {
                let s = &src[x * 4..x * 4 + 4];
                dst[x * 4] = s[2];
                dst[x * 4 + 1] = s[1];
                dst[x * 4 + 2] = s[0];
                dst[x * 4 + 3] = s[3];
            }
            Ok(())
        }
        FourCc::Bgrx => {
            for x in 0..width as usize {
                let s = &src[x * 4..x * 4 + 4];
                dst[x * 4] = s[2];
                dst[x * 4 + 1] = s[1];
                dst[x * 4 + 2] = s[0];
                dst[x * 4 + 3] = 0xFF;
            }
            Ok(())
        }
        FourCc::Rgba => {
            dst[..width as usize * 4].copy_from_slice(&src[..width as usize * 4]);
            Ok(())
        }
        FourCc::Rgbx => {
            for x in 0..width as usize {
                let s = &src[x * 4..x * 4 + 4];
                dst[x * 4] = s[0];
                dst[x * 4 + 1] = s[1];
                dst[x * 4 + 2] = s[2];
                dst[x * 4 + 3] = 0xFF;
            }
            Ok(())
        }
        FourCc::Uyvy => {
            let pairs = width as usize / 2;
            for p in 0..pairs {
                let u = src[p * 4] as i32;
                let y0 = src[p * 4 + 1] as i32;
                let v = src[p * 4 + 2] as i32;
                let y1 = src[p * 4 + 3] as i32;
                let (r0, g0, b0) = yuv_to_rgb(y0, u, v);
                let (r1, g1, b1) = yuv_to_rgb(y1, u, v);
                let x0 = p * 2 * 4;
                dst[x0] = r0;
                dst[x0 + 1] = g0;
                dst[x0 + 2] = b0;
                dst[x0 + 3] = 0xFF;
                dst[x0 + 4] = r1;
                dst[x0 + 5] = g1;
                dst[x0 + 6] = b1;
                dst[x0 + 7] = 0xFF;
            }
            Ok(())
        }
        other => Err(RenderError::UnsupportedPixelFormat(other)),
    }
}

/// BT.601 limited-range YUV -> RGB.
pub fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    let c = y - 16;
    let d = u - 128;
    let e = v - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    (r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ReleaseFn;
    use std::sync::Arc;

    fn frame<'a>(width: u32, height: u32, fourcc: FourCc, stride: i32, data: &'a [u8]) -> VideoFrame<'a> {
        let release: ReleaseFn = Arc::new(|_h| {});
        VideoFrame::new(width, height, fourcc, stride, (30, 1), 0, 0, data, 1, release)
    }

    #[test]
    fn bt601_black_maps_to_zero() {
        assert_eq!(yuv_to_rgb(16, 128, 128), (0, 0, 0));
    }

    #[test]
    fn bt601_white_maps_near_max() {
        let (r, g, b) = yuv_to_rgb(235, 128, 128);
        assert!(r >= 250 && g >= 250 && b >= 250);
    }

    #[test]
    fn uyvy_black_frame_renders_all_black_rgba() {
        let data = vec![128u8, 16, 128, 16, 128, 16, 128, 16]; // two black pixel pairs, one row
        let f = frame(4, 1, FourCc::Uyvy, 0, &data);
        let mut out = Vec::new();
        let mut w = 0;
        let mut h = 0;
        convert_to_rgba(&f, &mut out, &mut w, &mut h).unwrap();
        assert_eq!(out.len(), 4 * 1 * 4);
        for px in out.chunks(4) {
            assert_eq!(px, &[0, 0, 0, 255]);
        }
    }

    #[test]
    fn writes_exactly_width_height_times_4_bytes() {
        let data = vec![0xAAu8; 2 * 2 * 4];
        let f = frame(2, 2, FourCc::Bgra, 0, &data);
        let mut out = Vec::new();
        let mut w = 0;
        let mut h = 0;
        convert_to_rgba(&f, &mut out, &mut w, &mut h).unwrap();
        assert_eq!(out.len(), 2 * 2 * 4);
    }

    #[test]
    fn rejects_stride_smaller_than_row_bytes() {
        let data = vec![0u8; 16];
        let f = frame(4, 1, FourCc::Bgra, 4, &data); // row needs 16 bytes, stride=4 too small
        let mut out = Vec::new();
        let mut w = 0;
        let mut h = 0;
        assert!(matches!(convert_to_rgba(&f, &mut out, &mut w, &mut h), Err(RenderError::InvalidStride { .. })));
    }

    #[test]
    fn negative_stride_flips_row_order() {
        // Two rows of 1 BGRA pixel: row0 (bottom in memory) = red, row1 (top in memory) = blue.
        // Negative stride means buffer row0 is the *last* displayed row.
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 255, 255]); // BGRA for red (B=0,G=0,R=255)
        data.extend_from_slice(&[255, 0, 0, 255]); // BGRA for blue (B=255,G=0,R=0)
        let f = frame(1, 2, FourCc::Bgra, -4, &data);
        let mut out = Vec::new();
        let mut w = 0;
        let mut h = 0;
        convert_to_rgba(&f, &mut out, &mut w, &mut h).unwrap();
        // Display row 0 should be the buffer's last row (blue), row 1 the first (red).
        assert_eq!(&out[0..4], &[0, 0, 255, 255]); // RGBA blue
        assert_eq!(&out[4..8], &[255, 0, 0, 255]); // RGBA red
    }

    #[test]
    fn detects_undersized_buffer() {
        let data = vec![0u8; 4]; // way too short for 4x4 BGRA
        let f = frame(4, 4, FourCc::Bgra, 0, &data);
        let mut out = Vec::new();
        let mut w = 0;
        let mut h = 0;
        assert!(matches!(convert_to_rgba(&f, &mut out, &mut w, &mut h), Err(RenderError::InvalidBuffer { .. })));
    }
}
