//! Client-side exports of already-fetched lists. Nothing here talks to the
//! backend; the output reflects exactly the in-memory records passed in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::model::LineFollower;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One exported column: header plus accessor.
pub struct Column<T> {
    pub header: &'static str,
    pub value: fn(&T) -> String,
}

fn timestamp_field(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Default column set for follower exports.
pub fn follower_columns() -> Vec<Column<LineFollower>> {
    vec![
        Column {
            header: "LINE User ID",
            value: |f: &LineFollower| f.line_user_id.clone(),
        },
        Column {
            header: "Display Name",
            value: |f: &LineFollower| f.display_name.clone(),
        },
        Column {
            header: "Status",
            value: |f: &LineFollower| f.status.as_str().to_string(),
        },
        Column {
            header: "Status Message",
            value: |f: &LineFollower| f.status_message.clone(),
        },
        Column {
            header: "Followed At",
            value: |f: &LineFollower| timestamp_field(f.followed_at),
        },
        Column {
            header: "Last Interaction",
            value: |f: &LineFollower| timestamp_field(f.last_interaction_at),
        },
        Column {
            header: "Messages",
            value: |f: &LineFollower| f.message_count.to_string(),
        },
        Column {
            header: "Interactions",
            value: |f: &LineFollower| f.interaction_count.to_string(),
        },
    ]
}

/// Pretty-printed JSON of the list as given.
pub fn export_json<T: Serialize>(records: &[T]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Header row from `columns`, then one row per record. Every field is
/// double-quoted so text that looks numeric stays text.
pub fn export_csv<T>(records: &[T], columns: &[Column<T>]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.header))?;
    for record in records {
        writer.write_record(columns.iter().map(|c| (c.value)(record)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Parsed CSV export: header row and data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn column(&self, header: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == header)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// Read an export produced by `export_csv` back into rows.
pub fn parse_csv_export(text: &str) -> Result<CsvTable, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(CsvTable { headers, rows })
}

pub fn stamped_filename(prefix: &str, extension: &str, date: NaiveDate) -> String {
    format!("{}{}.{}", prefix, date.format("%Y-%m-%d"), extension)
}

pub fn recommendations_filename(date: NaiveDate) -> String {
    stamped_filename("health-recommendations-", "json", date)
}

pub fn followers_filename(date: NaiveDate) -> String {
    stamped_filename("line_followers_", "csv", date)
}

/// Write `contents` to `dir/filename`, creating `dir` if needed.
pub fn write_export(dir: &Path, filename: &str, contents: &str) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, contents)?;
    info!(path = %path.display(), bytes = contents.len(), "export written");
    Ok(path)
}
