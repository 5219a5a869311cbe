use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::models::{HISTORY_COLUMNS, HistoryEntry};

/// Append-only daily log kept as a CSV file.
///
/// Every save rewrites the whole file with the existing rows plus the new one.
/// Rows are never edited or removed.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows in file order. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, TrackerError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no history file yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(TrackerError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let entries = read_entries(file, &self.path)?;
        debug!(path = %self.path.display(), rows = entries.len(), "loaded history");
        Ok(entries)
    }

    /// Add a row for a new date. Rejects dates that are already logged
    /// without touching the file.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), TrackerError> {
        let mut entries = self.load()?;
        if entries.iter().any(|e| e.date == entry.date) {
            debug!(date = %entry.date, "date already logged, rejecting append");
            return Err(TrackerError::DuplicateDate(entry.date));
        }
        entries.push(entry.clone());
        self.write_all(&entries)?;
        info!(date = %entry.date, rows = entries.len(), "history entry saved");
        Ok(())
    }

    fn write_all(&self, entries: &[HistoryEntry]) -> Result<(), TrackerError> {
        let io_err = |source: std::io::Error| TrackerError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut wtr = csv::Writer::from_path(&self.path).map_err(|e| io_err(e.into()))?;
        for entry in entries {
            wtr.serialize(entry).map_err(|e| io_err(e.into()))?;
        }
        wtr.flush().map_err(io_err)?;
        Ok(())
    }
}

/// Parse history rows from any reader. `source` is only used in error messages.
///
/// The header must list exactly the history columns; unparseable rows fail
/// with their line number instead of being skipped.
pub fn read_entries<R: Read>(reader: R, source: &Path) -> Result<Vec<HistoryEntry>, TrackerError> {
    let malformed = |reason: String| TrackerError::MalformedHistory {
        path: source.to_path_buf(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| malformed(format!("failed to read header: {e}")))?
        .clone();

    // Zero-byte file
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    if !headers.iter().eq(HISTORY_COLUMNS) {
        let found: Vec<&str> = headers.iter().collect();
        return Err(malformed(format!(
            "expected columns {}, found {}",
            HISTORY_COLUMNS.join(","),
            found.join(",")
        )));
    }

    let mut entries = Vec::new();
    for (idx, result) in rdr.deserialize::<HistoryEntry>().enumerate() {
        let entry = result.map_err(|e| malformed(format!("line {}: {e}", idx + 2)))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Predicted weight over date, sorted by date, for charting.
#[must_use]
pub fn weight_series(entries: &[HistoryEntry]) -> Vec<(NaiveDate, f64)> {
    let mut series: Vec<(NaiveDate, f64)> = entries
        .iter()
        .filter_map(|e| {
            e.predicted_weight
                .filter(|kg| kg.is_finite())
                .map(|kg| (e.date, kg))
        })
        .collect();
    series.sort_by_key(|(date, _)| *date);
    series
}
