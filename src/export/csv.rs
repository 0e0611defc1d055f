use chrono::SecondsFormat;
use std::io::Write;
use std::path::Path;

use super::replace_file;
use crate::error::ExportError;
use crate::model::ClashRecord;

pub const CSV_HEADER: [&str; 12] = [
    "id",
    "group_id",
    "title",
    "severity",
    "status",
    "disciplines",
    "level",
    "categories",
    "created_at",
    "updated_at",
    "deep_link",
    "screenshot_url",
];

const LIST_SEPARATOR: &str = ";";

/// Writes `records` to `path`, replacing the file only once the whole CSV is written.
pub fn export_csv<P: AsRef<Path>>(records: &[&ClashRecord], path: P) -> Result<(), ExportError> {
    replace_file(path.as_ref(), |file| write_csv(records, file))
}

/// Writes one header row and one row per record, in the given order.
///
/// Multi-valued cells are joined with `;`, timestamps are RFC 3339 and
/// missing optional values are empty cells.
pub fn write_csv<W: Write>(records: &[&ClashRecord], out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);

    writer.write_record(CSV_HEADER)?;

    for record in records {
        let categories: Vec<&str> = record.categories().collect();
        let disciplines = record.disciplines.join(LIST_SEPARATOR);
        let categories = categories.join(LIST_SEPARATOR);
        let created_at = record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let updated_at = record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        writer.write_record([
            record.id.as_str(),
            record.group_id.as_str(),
            record.title.as_str(),
            record.severity.as_str(),
            record.status.as_str(),
            disciplines.as_str(),
            record.level.as_deref().unwrap_or_default(),
            categories.as_str(),
            created_at.as_str(),
            updated_at.as_str(),
            record.deep_link.as_deref().unwrap_or_default(),
            record.screenshot_url.as_deref().unwrap_or_default(),
        ])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
