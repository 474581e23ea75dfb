//! Typed configuration: the Preferences store and the
//! Receiver's creation-time options.
//!
//! Loading follows a lenient-JSON pattern: every field has a
//! `#[serde(default)]` so a config file can be partial or missing entirely
//! without failing the run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::{load_json_result, save_json_result, ConfigRoot};
use crate::error::CoreError;

/// Bandwidth enumeration accepted at Receiver creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Bandwidth {
    MetadataOnly,
    AudioOnly,
    Lowest,
    Highest,
}

impl Default for Bandwidth {
    fn default() -> Self {
        Bandwidth::Highest
    }
}

/// Color format enumeration: a `(progressive, fielded)` pair.
/// The first element is used for progressive frames, the second for fielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorFormat {
    BgrxBgra,
    UyvyBgra,
    RgbxRgba,
    UyvyRgba,
    Fastest,
    Best,
}

impl Default for ColorFormat {
    /// `BGRX_BGRA` is the default for this system: display
    /// friendly, because the app-layer decoder handles compressed frames
    /// directly rather than asking the receiver to decompress them.
    fn default() -> Self {
        ColorFormat::BgrxBgra
    }
}

/// Receiver creation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bandwidth: Bandwidth,
    pub color_format: ColorFormat,
    pub allow_video_fields: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::default(),
            color_format: ColorFormat::default(),
            allow_video_fields: false,
        }
    }
}

/// The Preferences key/value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub auto_reconnect: bool,
    pub screen_always_on: bool,
    pub show_osd: bool,
    pub last_source_name: Option<String>,
    pub last_source_url: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            screen_always_on: false,
            show_osd: true,
            last_source_name: None,
            last_source_url: None,
        }
    }
}

impl Preferences {
    pub fn load(root: &ConfigRoot) -> Result<Self, CoreError> {
        let path = root.join("preferences.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        load_json_result(&path)
    }

    pub fn save(&self, root: &ConfigRoot) -> Result<(), CoreError> {
        save_json_result(&root.join("preferences.json"), self)
    }

    /// Persist a successful connection as "last connected".
    pub fn record_last_connected(&mut self, name: &str, url: Option<&str>) {
        self.last_source_name = Some(name.to_string());
        self.last_source_url = url.map(|s| s.to_string());
    }
}

pub fn load_receiver_config(root: &ConfigRoot) -> ReceiverConfig {
    load_receiver_config_from_path(&root.join("receiver.json"))
}

fn load_receiver_config_from_path(path: &Path) -> ReceiverConfig {
    if !path.exists() {
        return ReceiverConfig::default();
    }
    load_json_result(path).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let root = ConfigRoot::discover_or_default(tmp.path());

        let mut prefs = Preferences::default();
        prefs.record_last_connected("CamA (HostX)", Some("ndi://host"));
        prefs.save(&root).unwrap();

        let loaded = Preferences::load(&root).unwrap();
        assert_eq!(loaded.last_source_name.as_deref(), Some("CamA (HostX)"));
        assert_eq!(loaded.last_source_url.as_deref(), Some("ndi://host"));
    }

    #[test]
    fn missing_preferences_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let root = ConfigRoot::discover_or_default(tmp.path());
        let loaded = Preferences::load(&root).unwrap();
        assert!(loaded.auto_reconnect);
        assert!(loaded.last_source_name.is_none());
    }

    #[test]
    fn receiver_config_default_matches_spec() {
        let cfg = ReceiverConfig::default();
        assert_eq!(cfg.color_format, ColorFormat::BgrxBgra);
        assert!(!cfg.allow_video_fields);
    }
}
