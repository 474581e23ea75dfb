use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// A validated root directory containing this node's runtime config
/// (`preferences.json`, `receiver.json`) and the `recordings/` directory.
///
/// This is the canonical way to pass the config location into the core,
/// keeping path resolution consistent across the CLI and any future UI.
#[derive(Debug, Clone)]
pub struct ConfigRoot {
    path: PathBuf,
}

impl ConfigRoot {
    /// Locate the `config/` directory.
    ///
    /// Resolution order:
    /// 1. `NDI_INGEST_CONFIG` env var, if set and the path exists.
    /// 2. Search upward from `start_dir` for a folder named `config`.
    pub fn discover(start_dir: &Path) -> Result<Self, CoreError> {
        if let Ok(p) = std::env::var("NDI_INGEST_CONFIG") {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Ok(Self { path: pb });
            }
        }

        let mut cur = start_dir.to_path_buf();
        loop {
            let cand = cur.join("config");
            if cand.exists() {
                return Ok(Self { path: cand });
            }
            if !cur.pop() {
                break;
            }
        }

        Err(CoreError::ConfigNotFound { start_dir: start_dir.to_path_buf() })
    }

    /// Like `discover`, but never fails: returns `start_dir/config` if nothing
    /// was found, so callers can create it on first write.
    pub fn discover_or_default(start_dir: &Path) -> Self {
        Self::discover(start_dir).unwrap_or_else(|_| Self { path: start_dir.join("config") })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.path.join("recordings")
    }
}

/// Read a UTF-8 file into a String (Result-based).
pub fn read_to_string_result(path: &Path) -> Result<String, CoreError> {
    std::fs::read_to_string(path).map_err(|e| CoreError::Io { path: path.to_path_buf(), source: e })
}

/// Deserialize JSON from a file (Result-based).
pub fn load_json_result<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let s = read_to_string_result(path)?;
    serde_json::from_str(&s).map_err(|e| CoreError::Json { path: path.to_path_buf(), source: e })
}

/// Serialize a value as pretty JSON, creating parent directories as needed.
pub fn save_json_result<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::Io { path: parent.to_path_buf(), source: e })?;
    }
    let s = serde_json::to_string_pretty(value).expect("config types are always serializable");
    std::fs::write(path, s).map_err(|e| CoreError::Io { path: path.to_path_buf(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_finds_config_dir_upward() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(tmp.path().join("config")).unwrap();

        let found = ConfigRoot::discover(&nested).unwrap();
        assert_eq!(found.path(), tmp.path().join("config"));
    }

    #[test]
    fn discover_fails_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("x/y");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(ConfigRoot::discover(&nested).is_err());
    }
}
