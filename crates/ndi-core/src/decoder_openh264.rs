//! Software H.264 `CodecBackend`/`EncoderBackend` implementations backed by
//! `openh264`, gated behind the `openh264` feature.
//!
//! This is not a substitute for a real hardware decoder/encoder (there is
//! no portable "hardware codec" crate); it lets the queue/thread machinery
//! around those traits be exercised by this
//! crate's own tests, and gives embedders a CPU fallback when no hardware
//! path is available. `openh264` only speaks H.264 — HEVC configure calls
//! fail with `CoreError::HandleCreationFailed`.

use openh264::decoder::Decoder as Oh264Decoder;
use openh264::encoder::{Encoder as Oh264Encoder, EncoderConfig, FrameType};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::error::CoreError;
use crate::native::{CodecBackend, CodecFrame, EncoderBackend};

pub struct Openh264Decoder {
    inner: Option<Oh264Decoder>,
    width: u32,
    height: u32,
}

impl Default for Openh264Decoder {
    fn default() -> Self {
        Self { inner: None, width: 0, height: 0 }
    }
}

impl CodecBackend for Openh264Decoder {
    fn configure(&mut self, mime: &str, width: u32, height: u32) -> Result<(), CoreError> {
        if mime != "video/avc" {
            return Err(CoreError::HandleCreationFailed { what: "openh264 decoder", msg: format!("unsupported mime {mime}") });
        }
        let decoder = Oh264Decoder::new()
            .map_err(|e| CoreError::HandleCreationFailed { what: "openh264 decoder", msg: e.to_string() })?;
        self.inner = Some(decoder);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn submit(&mut self, data: &[u8], _timestamp_us: i64) -> Result<(), CoreError> {
        let decoder = self.inner.as_mut().ok_or(CoreError::UnsupportedRecordingFormat { msg: "decoder not configured".into() })?;
        decoder
            .decode(data)
            .map(|_| ())
            .map_err(|e| CoreError::HandleCreationFailed { what: "openh264 decode", msg: e.to_string() })
    }

    fn poll_output(&mut self, _timeout_ms: u32) -> Result<Option<bool>, CoreError> {
        // `decode` above is synchronous and already produced (or didn't)
        // a picture; the queue/thread model around this trait still calls
        // `poll_output` on its own cadence, so there's nothing further to
        // drain here.
        Ok(None)
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

pub struct Openh264Encoder {
    inner: Option<Oh264Encoder>,
    width: u32,
    height: u32,
    pending: Vec<CodecFrame>,
}

impl Default for Openh264Encoder {
    fn default() -> Self {
        Self { inner: None, width: 0, height: 0, pending: Vec::new() }
    }
}

impl EncoderBackend for Openh264Encoder {
    fn configure(&mut self, width: u32, height: u32, bitrate_bps: u32, fps: u32) -> Result<(), CoreError> {
        let cfg = EncoderConfig::new(width, height).set_bitrate_bps(bitrate_bps).max_frame_rate(fps as f32);
        let encoder = Oh264Encoder::with_api_config(OpenH264API::from_source(), cfg)
            .map_err(|e| CoreError::HandleCreationFailed { what: "openh264 encoder", msg: e.to_string() })?;
        self.inner = Some(encoder);
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// `nv12` is semi-planar (interleaved UV); openh264 wants planar I420,
    /// so the UV plane is de-interleaved before handing it to `YUVBuffer`.
    fn submit_nv12(&mut self, nv12: &[u8], timestamp_us: i64) -> Result<(), CoreError> {
        let encoder = self.inner.as_mut().ok_or(CoreError::UnsupportedRecordingFormat { msg: "encoder not configured".into() })?;
        let w = self.width as usize;
        let h = self.height as usize;
        let y_size = w * h;
        let uv_size = y_size / 2;
        if nv12.len() < y_size + uv_size {
            return Err(CoreError::InvalidConfig { path: Default::default(), msg: "nv12 buffer too small".into() });
        }

        let mut i420 = Vec::with_capacity(y_size + uv_size);
        i420.extend_from_slice(&nv12[..y_size]);
        let uv = &nv12[y_size..y_size + uv_size];
        let mut u_plane = Vec::with_capacity(uv_size / 2);
        let mut v_plane = Vec::with_capacity(uv_size / 2);
        for chunk in uv.chunks_exact(2) {
            u_plane.push(chunk[0]);
            v_plane.push(chunk[1]);
        }
        i420.extend_from_slice(&u_plane);
        i420.extend_from_slice(&v_plane);

        let yuv = YUVBuffer::from_vec(i420, w, h);
        let encoded = encoder.encode(&yuv).map_err(|e| CoreError::HandleCreationFailed { what: "openh264 encode", msg: e.to_string() })?;

        let mut bytes = Vec::new();
        encoded.write(&mut bytes).map_err(|e| CoreError::Io { path: Default::default(), source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()) })?;
        self.pending.push(CodecFrame { data: bytes, timestamp_us, is_keyframe: encoded.frame_type() == FrameType::IDR });
        Ok(())
    }

    fn submit_eos(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn drain(&mut self) -> Result<Vec<CodecFrame>, CoreError> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn release(&mut self) {
        self.inner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_rejects_hevc_mime() {
        let mut dec = Openh264Decoder::default();
        assert!(dec.configure("video/hevc", 64, 48).is_err());
    }

    #[test]
    fn encoder_round_trip_produces_annexb_bytes() {
        let mut enc = Openh264Encoder::default();
        enc.configure(64, 48, 500_000, 30).unwrap();
        let nv12 = vec![16u8; 64 * 48 + 64 * 48 / 2];
        enc.submit_nv12(&nv12, 0).unwrap();
        let frames = enc.drain().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].data.starts_with(&[0, 0, 0, 1]) || frames[0].data.starts_with(&[0, 0, 1]));
    }
}
