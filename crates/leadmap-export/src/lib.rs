//! Flat-file export of accepted record sets (csv + xlsx twins).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use leadmap_core::BusinessRecord;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "leadmap-export";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    /// Accepts the wire names used by the download endpoint.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "csv" => Some(Self::Csv),
            "excel" | "xlsx" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("xlsx serialization failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Paths of the two artifacts written for one completed task.
#[derive(Debug, Clone)]
pub struct ExportedFiles {
    pub basename: String,
    pub csv_path: PathBuf,
    pub xlsx_path: PathBuf,
}

/// Persists record sets under a fixed export directory and resolves
/// previously written artifacts for download.
#[derive(Debug, Clone)]
pub struct ExportStore {
    root: PathBuf,
}

impl ExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{prefix}_{YYYYMMDD_HHMMSS}` — unique enough for one export per
    /// task per second, and sorts chronologically.
    pub fn timestamped_basename(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, Utc::now().format("%Y%m%d_%H%M%S"))
    }

    /// Writes `{basename}.csv` and `{basename}.xlsx`. An empty record set
    /// still produces headers-only files; zero results is a valid export.
    pub fn write_records(
        &self,
        basename: &str,
        records: &[BusinessRecord],
    ) -> Result<ExportedFiles, ExportError> {
        fs::create_dir_all(&self.root)?;

        let csv_path = self.root.join(format!("{basename}.csv"));
        let mut writer = csv::Writer::from_path(&csv_path)?;
        writer.write_record(BusinessRecord::COLUMNS)?;
        for record in records {
            writer.write_record(record.column_values())?;
        }
        writer.flush()?;

        let xlsx_path = self.root.join(format!("{basename}.xlsx"));
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let header_format = Format::new().set_bold();
        for (col, header) in BusinessRecord::COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        for (row, record) in records.iter().enumerate() {
            for (col, value) in record.column_values().iter().enumerate() {
                sheet.write_string((row + 1) as u32, col as u16, value.as_str())?;
            }
        }
        workbook.save(&xlsx_path)?;

        info!(basename, records = records.len(), "export written");
        Ok(ExportedFiles {
            basename: basename.to_string(),
            csv_path,
            xlsx_path,
        })
    }

    /// Resolves a previously exported artifact, or None when absent.
    /// Basenames with path separators never resolve.
    pub fn resolve(&self, basename: &str, format: ExportFormat) -> Option<PathBuf> {
        if basename.contains('/') || basename.contains('\\') || basename.contains("..") {
            return None;
        }
        let path = self
            .root
            .join(format!("{basename}.{}", format.extension()));
        path.is_file().then_some(path)
    }
}
