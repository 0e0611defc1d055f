use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::replace_file;
use crate::error::ExportError;
use crate::model::{ClashFilter, ClashRecord, KpiSummary};

/// Document written by [`export_json`].
#[derive(Debug, Serialize)]
pub struct ClashExport<'a> {
    pub generated_at: DateTime<Utc>,
    pub filter: &'a ClashFilter,
    pub kpis: &'a KpiSummary,
    pub clashes: &'a [&'a ClashRecord],
}

/// Pretty-printed JSON document with the filter, its KPIs and the records.
pub fn export_json<P: AsRef<Path>>(export: &ClashExport<'_>, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();
    replace_file(path, |file| {
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, export)?;
        out.flush().map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })
    })
}
