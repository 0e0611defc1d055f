pub mod csv;
pub mod json;

use std::fs::File;
use std::io::Write;
use std::path::Path;

pub use crate::error::ExportError;
pub use csv::{export_csv, write_csv};
pub use json::{export_json, ClashExport};

/// Fills a scratch file next to `path`, then moves it over `path`.
///
/// The target is either left untouched or fully replaced; the scratch file is
/// removed when `fill` or the final rename fails.
fn replace_file<F>(path: &Path, fill: F) -> Result<(), ExportError>
where
    F: FnOnce(&mut File) -> Result<(), ExportError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_err = |source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".export-")
        .tempfile_in(dir)
        .map_err(|source| ExportError::Create {
            path: path.to_path_buf(),
            source,
        })?;
    fill(tmp.as_file_mut())?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
