// src/ledger.rs
//
// The durable side of the engine: an append-merged CSV of every committed
// violation event, plus the in-memory session log for the current run.
// Repeat-offender status is defined against the *persisted* ledger only, so
// it stays stable with respect to what has actually been committed.
//
// The file is expected to survive hand-editing between runs: the merge
// unions column sets (back-filling empty cells on whichever side lacks a
// column) so appends never fail on schema drift.

use crate::types::{LedgerConfig, ViolationEvent};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed column order for a freshly created ledger.
pub const LEDGER_COLUMNS: [&str; 10] = [
    "timestamp",
    "violation_type",
    "vehicle_type",
    "confidence",
    "speed",
    "license_plate",
    "frame_no",
    "screenshot_path",
    "repeat_offender",
    "screenshot_display",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger file not found: {0}")]
    NotFound(PathBuf),
    #[error("permission denied on ledger file: {0}")]
    PermissionDenied(PathBuf),
    #[error("ledger file is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read-only rollup over the persisted ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSummary {
    pub total: usize,
    pub per_type: HashMap<String, usize>,
    pub repeat_offenders: usize,
    pub most_recent_timestamp: Option<String>,
}

pub struct Ledger {
    csv_path: PathBuf,
    screenshot_dir: PathBuf,
    session: Vec<ViolationEvent>,
}

impl Ledger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            csv_path: PathBuf::from(&config.csv_path),
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
            session: Vec::new(),
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    /// The not-yet-persisted events of the current run.
    pub fn session(&self) -> &[ViolationEvent] {
        &self.session
    }

    /// Record an event in the session log. No disk I/O happens here.
    pub fn append(&mut self, event: ViolationEvent) {
        debug!(
            "Session log += {} ({}, frame {})",
            event.violation_type.as_str(),
            event.vehicle_type,
            event.frame_no
        );
        self.session.push(event);
    }

    /// Whether `plate` appears in the *persisted* ledger. Unknown plates are
    /// never repeats, and any read failure (missing, locked, corrupt file)
    /// degrades to "no prior record" rather than failing the frame.
    pub fn is_repeat_offender(&self, plate: &str) -> bool {
        let plate = plate.trim();
        if plate.is_empty() || plate == "N/A" {
            return false;
        }
        let (headers, rows) = match self.read_table() {
            Ok(table) => table,
            Err(LedgerError::NotFound(_)) => return false,
            Err(e) => {
                warn!("Repeat-offender lookup degraded to false: {e}");
                return false;
            }
        };
        let Some(col) = headers.iter().position(|h| h == "license_plate") else {
            return false;
        };
        rows.iter()
            .any(|row| row.get(col).map(|cell| cell.trim() == plate).unwrap_or(false))
    }

    /// Merge the session log into the persisted ledger. Columns are unioned,
    /// rows concatenated and sorted most-recent-first, and the file replaced
    /// via a temp write so a mid-write failure cannot corrupt the prior
    /// ledger. The session log is cleared only after a successful write.
    ///
    /// Returns `None` without touching the file when the session is empty.
    pub fn flush(&mut self) -> Result<Option<PathBuf>, LedgerError> {
        if self.session.is_empty() {
            return Ok(None);
        }

        let (mut headers, mut rows) = match self.read_table() {
            Ok(table) => table,
            Err(LedgerError::NotFound(_)) => {
                (LEDGER_COLUMNS.iter().map(|s| s.to_string()).collect(), Vec::new())
            }
            Err(e) => {
                warn!("Cannot read existing ledger, session log kept in memory: {e}");
                return Err(e);
            }
        };

        // Union the column sets: every fixed column must exist in the file
        // schema, and existing rows get empty cells for anything they lack.
        for col in LEDGER_COLUMNS {
            if !headers.iter().any(|h| h == col) {
                headers.push(col.to_string());
            }
        }
        for row in &mut rows {
            row.resize(headers.len(), String::new());
        }

        for event in &self.session {
            rows.push(event_row(event, &headers));
        }

        // Most-recent-first. The millisecond timestamp format sorts
        // lexicographically in chronological order.
        let ts_col = headers.iter().position(|h| h == "timestamp");
        if let Some(ts) = ts_col {
            rows.sort_by(|a, b| {
                let ta = a.get(ts).map(String::as_str).unwrap_or("");
                let tb = b.get(ts).map(String::as_str).unwrap_or("");
                tb.cmp(ta)
            });
        }

        self.write_table(&headers, &rows)?;
        info!(
            "💾 Flushed {} event(s) to {} ({} total rows)",
            self.session.len(),
            self.csv_path.display(),
            rows.len()
        );
        self.session.clear();
        Ok(Some(self.csv_path.clone()))
    }

    /// Truncate the persisted ledger to just its header and drop the session
    /// log. Screenshot artifacts are removed best-effort — a half-removable
    /// directory is a warning, not a failure. Idempotent.
    pub fn clear(&mut self) -> Result<(), LedgerError> {
        let headers: Vec<String> = LEDGER_COLUMNS.iter().map(|s| s.to_string()).collect();
        self.write_table(&headers, &[])?;
        self.session.clear();

        if self.screenshot_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.screenshot_dir) {
                warn!(
                    "Could not fully remove screenshot dir {}: {e}",
                    self.screenshot_dir.display()
                );
            }
        }
        info!("🧹 Ledger cleared: {}", self.csv_path.display());
        Ok(())
    }

    /// Derived view over the persisted ledger. Never mutates and never
    /// fails: an empty or unreadable ledger reports zeroed defaults.
    pub fn summarize(&self) -> LedgerSummary {
        let (headers, rows) = match self.read_table() {
            Ok(table) => table,
            Err(LedgerError::NotFound(_)) => return LedgerSummary::default(),
            Err(e) => {
                warn!("Ledger summary degraded to defaults: {e}");
                return LedgerSummary::default();
            }
        };

        let col = |name: &str| headers.iter().position(|h| h == name);
        let type_col = col("violation_type");
        let repeat_col = col("repeat_offender");
        let ts_col = col("timestamp");

        let mut summary = LedgerSummary {
            total: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            if let Some(cell) = type_col.and_then(|c| row.get(c)) {
                if !cell.is_empty() {
                    *summary.per_type.entry(cell.clone()).or_insert(0) += 1;
                }
            }
            if let Some(cell) = repeat_col.and_then(|c| row.get(c)) {
                // Hand-edited or imported files may carry "True"/"TRUE"
                if cell.trim().eq_ignore_ascii_case("true") {
                    summary.repeat_offenders += 1;
                }
            }
            if let Some(cell) = ts_col.and_then(|c| row.get(c)) {
                if summary
                    .most_recent_timestamp
                    .as_deref()
                    .map(|current| cell.as_str() > current)
                    .unwrap_or(true)
                {
                    summary.most_recent_timestamp = Some(cell.clone());
                }
            }
        }
        summary
    }

    fn read_table(&self) -> Result<(Vec<String>, Vec<Vec<String>>), LedgerError> {
        let file = fs::File::open(&self.csv_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LedgerError::NotFound(self.csv_path.clone()),
            io::ErrorKind::PermissionDenied => LedgerError::PermissionDenied(self.csv_path.clone()),
            _ => LedgerError::Io(e),
        })?;

        // flexible: hand-edited files may have ragged rows
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| LedgerError::Corrupt(e.to_string()))?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok((headers, rows))
    }

    fn write_table(&self, headers: &[String], rows: &[Vec<String>]) -> Result<(), LedgerError> {
        if let Some(parent) = self.csv_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.csv_path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp).map_err(csv_io_error)?;
            writer.write_record(headers).map_err(csv_io_error)?;
            for row in rows {
                writer.write_record(row).map_err(csv_io_error)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.csv_path)?;
        Ok(())
    }
}

fn csv_io_error(e: csv::Error) -> LedgerError {
    match e.into_kind() {
        csv::ErrorKind::Io(io_err) => LedgerError::Io(io_err),
        other => LedgerError::Corrupt(format!("{other:?}")),
    }
}

fn event_row(event: &ViolationEvent, headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| match h.as_str() {
            "timestamp" => event.timestamp.clone(),
            "violation_type" => event.violation_type.as_str().to_string(),
            "vehicle_type" => event.vehicle_type.clone(),
            "confidence" => format!("{:.3}", event.confidence),
            "speed" => format!("{:.1}", event.speed_kmh),
            "license_plate" => event.license_plate.clone(),
            "frame_no" => event.frame_no.to_string(),
            "screenshot_path" => event.screenshot_path.clone(),
            "repeat_offender" => event.repeat_offender.to_string(),
            // Columns the event model does not carry (including
            // screenshot_display and anything hand-added) back-fill empty.
            _ => String::new(),
        })
        .collect()
}
