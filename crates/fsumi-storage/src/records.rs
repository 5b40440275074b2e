//! Existing-record store: remote sheet first, local JSON backup as fallback and mirror.

use std::sync::Arc;

use fsumi_core::NewsRecord;
use tracing::{error, info, warn};

use crate::backup::{BackupError, LocalBackup};
use crate::sheets::{a1_range, StoreError, TabularStore, ValueInputOption};

/// Columns: title, date, link, image, comma-joined categories.
pub const DATA_COLUMNS: &str = "A:E";
/// Everything below the header row.
pub const CLEAR_RANGE: &str = "A2:Z1000";
pub const HEADER_RANGE: &str = "A1:E1";
pub const HEADER: [&str; 5] = ["title", "date", "link", "image_url", "categories"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    Remote,
    LocalBackup,
    Empty,
}

#[derive(Debug)]
pub struct LoadedRecords {
    pub records: Vec<NewsRecord>,
    pub origin: RecordOrigin,
    /// Set when the remote read failed, as opposed to returning no rows.
    pub remote_error: Option<StoreError>,
    pub backup_error: Option<BackupError>,
}

#[derive(Debug)]
pub struct SaveReport {
    pub remote: Result<usize, StoreError>,
    pub backup: Result<(), BackupError>,
}

impl SaveReport {
    pub fn remote_updated(&self) -> bool {
        self.remote.is_ok()
    }

    pub fn backup_written(&self) -> bool {
        self.backup.is_ok()
    }
}

pub struct RecordStore {
    remote: Arc<dyn TabularStore>,
    backup: LocalBackup,
    default_sheet: String,
}

impl RecordStore {
    pub fn new(
        remote: Arc<dyn TabularStore>,
        backup: LocalBackup,
        default_sheet: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            backup,
            default_sheet: default_sheet.into(),
        }
    }

    pub fn backup(&self) -> &LocalBackup {
        &self.backup
    }

    /// First sheet of the spreadsheet, or the reason there is none.
    pub async fn resolve_sheet_name(&self) -> Result<String, StoreError> {
        let names = self.remote.sheet_names().await?;
        info!("available sheet names: {}", names.join(", "));
        names.into_iter().next().ok_or(StoreError::NoSheets)
    }

    /// Resolved sheet name, or the configured default when resolution fails.
    pub async fn sheet_name(&self) -> String {
        match self.resolve_sheet_name().await {
            Ok(name) => name,
            Err(err) => {
                error!(
                    "error getting sheet names: {err}; using default sheet {}",
                    self.default_sheet
                );
                self.default_sheet.clone()
            }
        }
    }

    pub async fn load_remote(&self) -> Result<Vec<NewsRecord>, StoreError> {
        info!("loading existing news from the spreadsheet");
        let sheet = self.sheet_name().await;
        info!("using sheet name: {sheet}");
        let rows = self.remote.read_range(&a1_range(&sheet, DATA_COLUMNS)).await?;
        info!("found {} rows in the spreadsheet", rows.len());

        let records: Vec<NewsRecord> = rows
            .iter()
            .skip(1)
            .filter(|row| row.first().is_some_and(|title| !title.trim().is_empty()))
            .map(|row| row_to_record(row))
            .collect();
        info!("loaded {} news items from the spreadsheet", records.len());
        Ok(records)
    }

    /// Never fails: remote, then local backup, then empty.
    pub async fn load(&self) -> LoadedRecords {
        let remote_error = match self.load_remote().await {
            Ok(records) if !records.is_empty() => {
                return LoadedRecords {
                    records,
                    origin: RecordOrigin::Remote,
                    remote_error: None,
                    backup_error: None,
                }
            }
            Ok(_) => {
                info!("no data rows found in the spreadsheet");
                None
            }
            Err(err) => {
                error!("error loading existing news from the spreadsheet: {err}");
                Some(err)
            }
        };

        info!("falling back to local file {}", self.backup.path().display());
        match self.backup.load().await {
            Ok(Some(records)) => {
                info!("loaded {} news items from local file", records.len());
                LoadedRecords {
                    records,
                    origin: RecordOrigin::LocalBackup,
                    remote_error,
                    backup_error: None,
                }
            }
            Ok(None) => LoadedRecords {
                records: Vec::new(),
                origin: RecordOrigin::Empty,
                remote_error,
                backup_error: None,
            },
            Err(err) => {
                error!("error loading existing news from file: {err}");
                LoadedRecords {
                    records: Vec::new(),
                    origin: RecordOrigin::Empty,
                    remote_error,
                    backup_error: Some(err),
                }
            }
        }
    }

    /// Clears and rewrites the data rows, then always mirrors to the local backup.
    pub async fn save(&self, records: &[NewsRecord]) -> SaveReport {
        let remote = self.save_remote(records).await;
        match &remote {
            Ok(rows) => info!("updated the spreadsheet with {rows} news items"),
            Err(err) => error!("error updating the spreadsheet: {err}"),
        }

        let backup = self.backup.save(records).await;
        match &backup {
            Ok(()) => info!("saved {} news items to local file", records.len()),
            Err(err) => error!("error saving news to file: {err}"),
        }

        SaveReport { remote, backup }
    }

    async fn save_remote(&self, records: &[NewsRecord]) -> Result<usize, StoreError> {
        info!("updating the spreadsheet");
        let sheet = self.sheet_name().await;
        let has_header = self
            .remote
            .read_range(&a1_range(&sheet, HEADER_RANGE))
            .await?
            .first()
            .is_some_and(|row| row.iter().any(|cell| !cell.trim().is_empty()));
        self.remote
            .clear_range(&a1_range(&sheet, CLEAR_RANGE))
            .await?;

        let mut rows: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
        if !has_header {
            warn!("sheet {sheet} has no header row, writing one");
            rows.push(HEADER.iter().map(|h| h.to_string()).collect());
        }
        let header_rows = rows.len();
        rows.extend(records.iter().map(record_to_row));
        let expected = rows.len();
        let written = self
            .remote
            .append_rows(
                &a1_range(&sheet, DATA_COLUMNS),
                rows,
                ValueInputOption::UserEntered,
            )
            .await?;
        if written != expected {
            warn!(expected, written, "spreadsheet reported a different row count");
        }
        Ok(written.saturating_sub(header_rows))
    }
}

/// Missing trailing cells default to empty values.
pub fn row_to_record(row: &[String]) -> NewsRecord {
    let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
    NewsRecord {
        title: cell(0),
        date: cell(1),
        link: cell(2),
        image_url: row.get(3).filter(|s| !s.is_empty()).cloned(),
        categories: categories_from_cell(&cell(4)),
    }
}

pub fn record_to_row(record: &NewsRecord) -> Vec<String> {
    vec![
        record.title.clone(),
        record.date.clone(),
        record.link.clone(),
        record.image_url.clone().unwrap_or_default(),
        record.categories.join(", "),
    ]
}

pub fn categories_from_cell(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
