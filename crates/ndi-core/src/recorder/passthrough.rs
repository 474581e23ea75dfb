//! Passthrough recording: Annex-B compressed frames muxed verbatim into MP4.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::frame::VideoFrameCopy;

use super::mp4_mux::{Mp4Muxer, TrackDescriptor};
use super::nal::{self, is_idr};

/// Per-recording state for the compressed-input branch.
pub struct PassthroughMuxerState {
    is_hevc: bool,
    width: u32,
    height: u32,
    csd_vps: Option<Vec<u8>>,
    csd_sps: Option<Vec<u8>>,
    csd_pps: Option<Vec<u8>>,
    first_timestamp: Option<i64>,
    muxer: Option<Mp4Muxer<File>>,
    path: PathBuf,
    sample_count: u64,
}

impl PassthroughMuxerState {
    pub fn new(is_hevc: bool, width: u32, height: u32, path: PathBuf) -> Self {
        Self {
            is_hevc,
            width,
            height,
            csd_vps: None,
            csd_sps: None,
            csd_pps: None,
            first_timestamp: None,
            muxer: None,
            path,
            sample_count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn muxer_started(&self) -> bool {
        self.muxer.is_some()
    }

    fn csd_complete(&self) -> bool {
        if self.is_hevc {
            self.csd_vps.is_some() && self.csd_sps.is_some() && self.csd_pps.is_some()
        } else {
            self.csd_sps.is_some() && self.csd_pps.is_some()
        }
    }

    /// Harvests CSD from `frame`, starting the muxer exactly once as soon as
    /// all required parameter sets are present. Frames
    /// received before CSD is complete are dropped (but recording is still
    /// considered active).
    pub fn ingest(&mut self, frame: &VideoFrameCopy) -> Result<(), CoreError> {
        let units = nal::scan_nal_units(&frame.data, self.is_hevc);

        for unit in &units {
            let bytes = frame.data[unit.start..unit.end].to_vec();
            if self.is_hevc {
                match unit.nal_type {
                    nal::H265_VPS if self.csd_vps.is_none() => self.csd_vps = Some(bytes),
                    nal::H265_SPS if self.csd_sps.is_none() => self.csd_sps = Some(bytes),
                    nal::H265_PPS if self.csd_pps.is_none() => self.csd_pps = Some(bytes),
                    _ => {}
                }
            } else {
                match unit.nal_type {
                    nal::H264_SPS if self.csd_sps.is_none() => self.csd_sps = Some(bytes),
                    nal::H264_PPS if self.csd_pps.is_none() => self.csd_pps = Some(bytes),
                    _ => {}
                }
            }
        }

        if self.muxer.is_none() {
            if !self.csd_complete() {
                return Ok(());
            }
            let track = if self.is_hevc {
                TrackDescriptor::Hevc {
                    width: self.width,
                    height: self.height,
                    vps: self.csd_vps.clone().expect("vps present, checked by csd_complete"),
                    sps: self.csd_sps.clone().expect("sps present, checked by csd_complete"),
                    pps: self.csd_pps.clone().expect("pps present, checked by csd_complete"),
                }
            } else {
                TrackDescriptor::Avc {
                    width: self.width,
                    height: self.height,
                    sps: self.csd_sps.clone().expect("sps present, checked by csd_complete"),
                    pps: self.csd_pps.clone().expect("pps present, checked by csd_complete"),
                }
            };
            let file = Mp4Muxer::create_file(&self.path)?;
            self.muxer = Some(Mp4Muxer::start(file, track)?);
        }

        let first_ts = *self.first_timestamp.get_or_insert(frame.timestamp);
        let presentation_time_us = (frame.timestamp - first_ts).max(0) as u64;
        let keyframe = units.iter().any(|u| is_idr(u.nal_type, self.is_hevc));

        if let Some(muxer) = self.muxer.as_mut() {
            muxer.write_sample(&frame.data, presentation_time_us, keyframe)?;
            self.sample_count += 1;
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<(), CoreError> {
        if let Some(muxer) = self.muxer.as_mut() {
            muxer.finalize()?;
        }
        Ok(())
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

/// `NDI_{YYYYMMDD_HHMMSS}_{W}x{H}_{codecLabel}.mp4`.
pub fn recording_filename(started_at_unix_secs: i64, width: u32, height: u32, is_hevc: bool) -> String {
    let (year, month, day, hour, min, sec) = civil_timestamp(started_at_unix_secs);
    let codec = if is_hevc { "H265" } else { "H264" };
    format!("NDI_{year:04}{month:02}{day:02}_{hour:02}{min:02}{sec:02}_{width}x{height}_{codec}.mp4")
}

fn civil_timestamp(unix_secs: i64) -> (i64, i64, i64, i64, i64, i64) {
    let days = unix_secs.div_euclid(86_400);
    let sod = unix_secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    (year, month, day, sod / 3600, (sod % 3600) / 60, sod % 60)
}

// Howard Hinnant civil_from_days; same algorithm used by ndi-cli's logging.
fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }).div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096).div_euclid(365);
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2).div_euclid(153);
    let d = doy - (153 * mp + 2).div_euclid(5) + 1;
    let m = mp + if mp < 10 { 3 } else { -9 };
    let year = y + if m <= 2 { 1 } else { 0 };
    (year, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(data: Vec<u8>, timestamp: i64) -> VideoFrameCopy {
        VideoFrameCopy {
            width: 64,
            height: 48,
            fourcc: crate::frame::FourCc::H264,
            line_stride_bytes: 0,
            frame_rate: (30, 1),
            timestamp,
            data_size_bytes: data.len() as u32,
            data,
        }
    }

    #[test]
    fn drops_frames_before_csd_complete_but_starts_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PassthroughMuxerState::new(false, 64, 48, dir.path().join("out.mp4"));

        let sps = [0, 0, 1, 0x67, 1, 2, 3];
        let idr = [0, 0, 1, 0x65, 9, 9, 9];
        state.ingest(&copy(sps.to_vec(), 0)).unwrap();
        assert!(!state.muxer_started());

        let pps = [0, 0, 1, 0x68, 4];
        let mut combined = pps.to_vec();
        combined.extend_from_slice(&idr);
        state.ingest(&copy(combined, 0)).unwrap();
        assert!(state.muxer_started());
        assert_eq!(state.sample_count(), 1);
    }

    #[test]
    fn filename_matches_scheme() {
        let name = recording_filename(0, 1920, 1080, false);
        assert!(name.starts_with("NDI_19700101_000000_1920x1080_H264.mp4"));
    }
}
