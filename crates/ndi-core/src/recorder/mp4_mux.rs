//! The realized MP4 muxer.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use crate::error::CoreError;

/// Track descriptor for the one video track this recorder ever writes.
pub enum TrackDescriptor {
    Avc { width: u32, height: u32, sps: Vec<u8>, pps: Vec<u8> },
    Hevc { width: u32, height: u32, vps: Vec<u8>, sps: Vec<u8>, pps: Vec<u8> },
}

/// Wraps `mp4::Mp4Writer<T>`. Constructed via `start`, which both adds the
/// track descriptor and begins the container in one call since this
/// recorder never needs more than one video track.
pub struct Mp4Muxer<T: Write + Seek> {
    writer: Option<mp4::Mp4Writer<T>>,
    track_id: u32,
}

impl Mp4Muxer<File> {
    /// Opens `path` for writing, creating parent directories as needed.
    /// Does not start the container yet — call `start` once CSD is ready.
    pub fn create_file(path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Io { path: parent.to_path_buf(), source: e })?;
        }
        File::create(path).map_err(|e| CoreError::Io { path: path.to_path_buf(), source: e })
    }
}

impl<T: Write + Seek> Mp4Muxer<T> {
    /// Adds the single video track and starts the container. Called
    /// exactly once, immediately after CSD assembly.
    pub fn start(sink: T, track: TrackDescriptor) -> Result<Self, CoreError> {
        let mp4_config = mp4::Mp4Config {
            major_brand: "isom".parse().expect("valid brand"),
            minor_version: 512,
            compatible_brands: vec![
                "isom".parse().expect("valid brand"),
                "iso2".parse().expect("valid brand"),
                "avc1".parse().expect("valid brand"),
                "mp41".parse().expect("valid brand"),
            ],
            timescale: 1_000_000,
        };

        let mut writer = mp4::Mp4Writer::write_start(sink, &mp4_config)
            .map_err(|e| CoreError::HandleCreationFailed { what: "mp4 writer", msg: e.to_string() })?;

        let track_conf = match track {
            TrackDescriptor::Avc { width, height, sps, pps } => mp4::TrackConfig {
                track_type: mp4::TrackType::Video,
                timescale: 1_000_000,
                language: "und".to_string(),
                media_conf: mp4::MediaConfig::AvcConfig(mp4::AvcConfig {
                    width: width as u16,
                    height: height as u16,
                    seq_param_set: sps,
                    pic_param_set: pps,
                }),
            },
            TrackDescriptor::Hevc { width, height, vps, sps, pps } => mp4::TrackConfig {
                track_type: mp4::TrackType::Video,
                timescale: 1_000_000,
                language: "und".to_string(),
                media_conf: mp4::MediaConfig::HevcConfig(mp4::HevcConfig {
                    width: width as u16,
                    height: height as u16,
                    vid_param_set: vps,
                    seq_param_set: sps,
                    pic_param_set: pps,
                }),
            },
        };

        writer.add_track(&track_conf).map_err(|e| CoreError::HandleCreationFailed { what: "mp4 track", msg: e.to_string() })?;

        Ok(Self { writer: Some(writer), track_id: 1 })
    }

    /// Writes one sample verbatim.
    pub fn write_sample(&mut self, bytes: &[u8], presentation_time_us: u64, is_keyframe: bool) -> Result<(), CoreError> {
        let writer = self.writer.as_mut().ok_or(CoreError::UnsupportedRecordingFormat { msg: "muxer not started".into() })?;
        let sample = mp4::Mp4Sample {
            start_time: presentation_time_us,
            duration: 0,
            rendering_offset: 0,
            is_sync: is_keyframe,
            bytes: mp4::Bytes::copy_from_slice(bytes),
        };
        writer.write_sample(self.track_id, &sample).map_err(|e| CoreError::Io {
            path: std::path::PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })
    }

    pub fn finalize(&mut self) -> Result<(), CoreError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_end().map_err(|e| CoreError::Io {
                path: std::path::PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn start_and_write_sample_round_trip() {
        let sink = Cursor::new(Vec::<u8>::new());
        let mut muxer = Mp4Muxer::start(
            sink,
            TrackDescriptor::Avc { width: 640, height: 480, sps: vec![0, 0, 1, 0x67, 1, 2, 3], pps: vec![0, 0, 1, 0x68, 4] },
        )
        .unwrap();
        muxer.write_sample(&[0, 0, 1, 0x65, 9, 9], 0, true).unwrap();
        muxer.write_sample(&[0, 0, 1, 0x41, 1, 2], 33_333, false).unwrap();
        muxer.finalize().unwrap();
    }
}
