//! `--list-recordings`: a small read-only index over the recordings directory.
//!
//! The core's Recorder only tracks the file it is currently writing
//! (`last_file()`); listing everything already on disk has no counterpart in
//! `ndi-core` and belongs at the CLI boundary.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct RecordingEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// Scans `dir` for `.mp4` files, newest first. Returns an empty list if the
/// directory doesn't exist yet (no recording has ever been made).
pub fn list_recordings(dir: &Path) -> Vec<RecordingEntry> {
    let mut entries = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return entries,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(RecordingEntry { path, size_bytes: meta.len(), modified });
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    entries
}

pub fn print_recordings(dir: &Path) {
    let entries = list_recordings(dir);
    if entries.is_empty() {
        println!("no recordings in {}", dir.display());
        return;
    }
    for entry in &entries {
        let mb = entry.size_bytes as f64 / (1024.0 * 1024.0);
        println!("{}  {:.1} MiB", entry.path.display(), mb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_mp4_files_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.mp4"), b"short").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(tmp.path().join("b.mp4"), b"longer file").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"ignore me").unwrap();

        let entries = list_recordings(tmp.path());
        assert_eq!(entries.len(), 2);
        assert!(entries[0].path.ends_with("b.mp4"));
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let entries = list_recordings(Path::new("/nonexistent/ndi-ingest-recordings"));
        assert!(entries.is_empty());
    }
}
