//! On-disk storage for generated reports and viewer captures.
//!
//! Reports live in the exports directory as `clash_report_<timestamp>_<hex>.pdf`;
//! captures live in the captures directory as `<clash_id>.png`. Every write
//! goes through a temporary file in the target directory that is renamed
//! into place, so readers never observe a partial file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::error::StorageError;

pub const REPORT_PREFIX: &str = "clash_report_";
const REPORT_EXTENSION: &str = "pdf";
const CAPTURE_EXTENSION: &str = "png";
const MAX_ID_LEN: usize = 128;

/// Lookup of stored captures by clash id.
pub trait CaptureLookup: Send + Sync {
    /// Raw image bytes, or `None` when no capture exists or it cannot be read.
    fn capture(&self, clash_id: &str) -> Option<Vec<u8>>;
}

/// A report file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredReport {
    pub report_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    exports_dir: PathBuf,
    captures_dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating both directories if needed.
    pub fn new(
        exports_dir: impl Into<PathBuf>,
        captures_dir: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let store = Self {
            exports_dir: exports_dir.into(),
            captures_dir: captures_dir.into(),
        };
        for dir in [&store.exports_dir, &store.captures_dir] {
            fs::create_dir_all(dir).map_err(|source| StorageError::Directory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(store)
    }

    #[must_use]
    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    /// Decodes `image_data` (plain base64 or a `data:` URL) and stores it as
    /// the capture of `clash_id`, replacing any previous one.
    pub fn save_capture(&self, clash_id: &str, image_data: &str) -> Result<PathBuf, StorageError> {
        let path = self.capture_path(clash_id)?;
        let bytes = decode_image_data(image_data)?;

        write_atomic(&self.captures_dir, &path, &bytes)?;
        info!(clash = clash_id, bytes = bytes.len(), "capture stored");
        Ok(path)
    }

    pub fn capture_path(&self, clash_id: &str) -> Result<PathBuf, StorageError> {
        validate_id(clash_id)?;
        Ok(self
            .captures_dir
            .join(format!("{clash_id}.{CAPTURE_EXTENSION}")))
    }

    /// Bytes of the capture for `clash_id`, `None` if there is none.
    pub fn read_capture(&self, clash_id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.capture_path(clash_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    /// Writes a finished report under a fresh unique name.
    pub fn save_report(
        &self,
        bytes: &[u8],
        generated_at: DateTime<Utc>,
    ) -> Result<StoredReport, StorageError> {
        let report_id = new_report_id(generated_at);
        let path = self.report_path(&report_id)?;

        write_atomic(&self.exports_dir, &path, bytes)?;
        info!(report = %report_id, bytes = bytes.len(), "report stored");

        Ok(StoredReport {
            report_id,
            path,
            size_bytes: bytes.len() as u64,
        })
    }

    /// Path of the report with the given id. The id is the file stem.
    pub fn report_path(&self, report_id: &str) -> Result<PathBuf, StorageError> {
        validate_id(report_id)?;
        Ok(self
            .exports_dir
            .join(format!("{report_id}.{REPORT_EXTENSION}")))
    }

    /// Report with the given id, if it exists.
    pub fn find_report(&self, report_id: &str) -> Result<Option<StoredReport>, StorageError> {
        let path = self.report_path(report_id)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(StoredReport {
                report_id: report_id.to_string(),
                path,
                size_bytes: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    /// Most recently modified PDF in the exports directory.
    ///
    /// Ties on modification time go to the lexically greater name, which for
    /// generated reports is the later timestamp.
    pub fn latest_report(&self) -> Result<Option<StoredReport>, StorageError> {
        let entries = fs::read_dir(&self.exports_dir).map_err(|source| StorageError::Read {
            path: self.exports_dir.clone(),
            source,
        })?;

        let mut latest: Option<(SystemTime, String, StoredReport)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(REPORT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_id(stem).is_err() {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (
                modified,
                stem.to_string(),
                StoredReport {
                    report_id: stem.to_string(),
                    path: path.clone(),
                    size_bytes: meta.len(),
                },
            );
            let newer = latest
                .as_ref()
                .is_none_or(|(t, name, _)| (modified, stem) > (*t, name.as_str()));
            if newer {
                latest = Some(candidate);
            }
        }

        Ok(latest.map(|(_, _, report)| report))
    }
}

impl CaptureLookup for FileStore {
    fn capture(&self, clash_id: &str) -> Option<Vec<u8>> {
        match self.read_capture(clash_id) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(clash = clash_id, error = %e, "capture unavailable");
                None
            }
        }
    }
}

/// Accepts ids made of ASCII letters, digits, `-`, `_` and `.` that do not
/// start with a dot, so an id can never leave its directory.
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId { id: id.to_string() })
    }
}

fn new_report_id(generated_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{REPORT_PREFIX}{}_{}",
        generated_at.format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

fn decode_image_data(image_data: &str) -> Result<Vec<u8>, StorageError> {
    let trimmed = image_data.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => trimmed,
    };
    let bytes = STANDARD.decode(payload)?;
    if bytes.is_empty() {
        return Err(StorageError::EmptyImage);
    }
    Ok(bytes)
}

/// Writes `bytes` to `target` through a temporary sibling file.
///
/// The temporary file is removed when any step fails.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: target.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("exports"), dir.path().join("captures")).unwrap();
        (dir, store)
    }

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .count()
    }

    #[test]
    fn rejects_ids_that_escape_the_directory() {
        for id in ["", "../etc/passwd", "a/b", ".hidden", "a\\b", "clash 1"] {
            assert!(validate_id(id).is_err(), "{id:?} accepted");
        }
        for id in ["clash_00001", "abc-DEF.1"] {
            assert!(validate_id(id).is_ok(), "{id:?} rejected");
        }
    }

    #[test]
    fn report_ids_follow_naming_scheme() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        let id = new_report_id(at);
        assert!(id.starts_with("clash_report_20240301_140509_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_report_id(at));
    }

    #[test]
    fn saved_report_is_complete_and_latest() {
        let (_dir, store) = store();
        assert!(store.latest_report().unwrap().is_none());

        let first = store.save_report(b"%PDF-first", Utc::now()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = store.save_report(b"%PDF-second", Utc::now()).unwrap();

        assert_eq!(fs::read(&first.path).unwrap(), b"%PDF-first");
        assert_eq!(second.size_bytes, 11);
        assert_eq!(store.latest_report().unwrap().unwrap().report_id, second.report_id);
        assert_eq!(leftover_temp_files(store.exports_dir()), 0);
    }

    #[test]
    fn find_report_by_id() {
        let (_dir, store) = store();
        let saved = store.save_report(b"%PDF", Utc::now()).unwrap();
        assert_eq!(store.find_report(&saved.report_id).unwrap(), Some(saved));
        assert!(store.find_report("clash_report_missing").unwrap().is_none());
        assert!(store.find_report("../secret").is_err());
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let (_dir, store) = store();
        // A directory in the way makes the rename fail.
        let target = store.exports_dir().join("blocked.pdf");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        assert!(write_atomic(store.exports_dir(), &target, b"data").is_err());
        assert_eq!(leftover_temp_files(store.exports_dir()), 0);
    }

    #[test]
    fn capture_accepts_base64_and_data_urls() {
        let (_dir, store) = store();
        let encoded = STANDARD.encode(b"\x89PNG fake");

        let path = store.save_capture("clash_00001", &encoded).unwrap();
        assert!(path.ends_with("clash_00001.png"));
        assert_eq!(
            store.read_capture("clash_00001").unwrap().unwrap(),
            b"\x89PNG fake"
        );

        let url = format!("data:image/png;base64,{}", STANDARD.encode(b"second"));
        store.save_capture("clash_00001", &url).unwrap();
        assert_eq!(store.capture("clash_00001").unwrap(), b"second");
    }

    #[test]
    fn capture_rejects_bad_input() {
        let (_dir, store) = store();
        assert!(matches!(
            store.save_capture("clash_1", "not base64!!"),
            Err(StorageError::InvalidImage { .. })
        ));
        assert!(matches!(
            store.save_capture("clash_1", ""),
            Err(StorageError::EmptyImage)
        ));
        assert!(matches!(
            store.save_capture("../x", "AAAA"),
            Err(StorageError::InvalidId { .. })
        ));
        assert!(store.capture("clash_1").is_none());
    }
}
